//! Locally rendered responses.
//!
//! # Design Decisions
//! - Nothing here touches the network; these are the responses that remain
//!   when every dependency is down
//! - The fallback page is static, so it can never fail to render

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::{Response, StatusCode};

use crate::security::Rejection;

pub const FALLBACK_RETRY_AFTER_SECS: u64 = 30;

/// Served with 503 when no valid response can be produced.
pub const FALLBACK_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Temporarily unavailable</title>
<style>
body{font-family:system-ui,-apple-system,sans-serif;background:#f6f7f9;color:#1f2933;display:flex;align-items:center;justify-content:center;min-height:100vh;margin:0}
main{max-width:28rem;padding:2rem;text-align:center}
h1{font-size:1.5rem;margin-bottom:.5rem}
p{color:#52606d}
</style>
</head>
<body>
<main>
<h1>We'll be right back</h1>
<p>The service is temporarily unavailable. This page will retry automatically in <span id="countdown">30</span> seconds.</p>
</main>
<script>
(function(){var s=30,el=document.getElementById("countdown");var t=setInterval(function(){s-=1;if(el){el.textContent=String(s)}if(s<=0){clearInterval(t);window.location.reload()}},1000)})();
</script>
</body>
</html>
"#;

/// 503 fallback page with `Retry-After: 30`.
pub fn fallback_response() -> Response<Body> {
    let mut response = Response::new(Body::from(FALLBACK_PAGE));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::RETRY_AFTER, HeaderValue::from(FALLBACK_RETRY_AFTER_SECS));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// 429 carrying retry guidance and the rate-limit headers.
pub fn rate_limited_response(rejection: &Rejection) -> Response<Body> {
    let body = serde_json::json!({
        "error": "rate_limited",
        "tier": rejection.tier.as_str(),
        "retryAfter": rejection.retry_after_secs,
    });
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    rejection.apply_headers(headers);
    response
}

/// Plain-text error for client mistakes (oversized body, bad target).
pub fn client_error(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Tier;

    #[test]
    fn test_fallback_shape() {
        let response = fallback_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(FALLBACK_PAGE.contains("location.reload"));
    }

    #[test]
    fn test_rate_limited_shape() {
        let response = rate_limited_response(&Rejection {
            tier: Tier::Auth,
            limit: 5,
            retry_after_secs: 60,
            reset_at: 120,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["x-ratelimit-reset"], "120");
    }
}
