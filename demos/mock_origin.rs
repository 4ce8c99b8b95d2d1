//! Local origin for trying the gateway by hand.
//!
//! `cargo run --example mock_origin -- 3000` starts a healthy origin,
//! `cargo run --example mock_origin -- 3001 broken` one that answers 500.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(3000);
    let broken = args.next().as_deref() == Some("broken");

    let app = if broken {
        Router::new().fallback(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "origin is broken") })
    } else {
        Router::new()
            .route(
                "/",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<h1>Hello from the origin</h1>",
                    )
                }),
            )
            .route("/health", get(|| async { "ok" }))
            .route(
                "/api/products",
                get(|| async { Json(serde_json::json!([{ "id": 1, "name": "lamp" }])) }),
            )
            .route(
                "/api/auth/login",
                axum::routing::post(|| async { Json(serde_json::json!({ "token": "demo" })).into_response() }),
            )
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Mock origin listening on http://{} (broken: {})", addr, broken);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
