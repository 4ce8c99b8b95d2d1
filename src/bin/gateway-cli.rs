use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Admin CLI for the edge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081", env = "GATEWAY_ADMIN_URL")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway version and uptime
    Status,
    /// Last health check per origin
    Origins,
    /// Response cache statistics
    Cache,
    /// Exact counter increment for a client identity
    Increment {
        identity: String,
    },
    /// Session management
    #[command(subcommand)]
    Session(SessionCommands),
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Create a session with optional JSON attributes
    Create {
        #[arg(long, default_value = "{}")]
        attributes: String,
    },
    /// Validate a session id
    Validate {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Origins => client.get(format!("{}/admin/origins", base)),
        Commands::Cache => client.get(format!("{}/admin/cache", base)),
        Commands::Increment { identity } => {
            client.post(format!("{}/admin/counters/{}", base, identity))
        }
        Commands::Session(SessionCommands::Create { attributes }) => {
            let attributes: Value = serde_json::from_str(&attributes)?;
            client
                .post(format!("{}/admin/sessions", base))
                .json(&attributes)
        }
        Commands::Session(SessionCommands::Validate { id }) => {
            client.get(format!("{}/admin/sessions/{}", base, id))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
