//! Request descriptor and client tagging.
//!
//! # Responsibilities
//! - Buffer the inbound request into an immutable descriptor
//! - Reconstruct the absolute public URL (cache key input)
//! - Resolve client identity and country from connection metadata
//!
//! # Design Decisions
//! - Bodies are buffered up front so a failover attempt can replay them
//! - Body size is capped before it is fully read
//! - The socket address is used when no client-IP header is present

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use url::Url;

use crate::config::GeoConfig;
use crate::http::gateway::GatewayError;

pub const X_REQUEST_ID: &str = "x-request-id";

/// An inbound request, fully received.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute URL as the client addressed it.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: String,
    /// Filled in by geolocation tagging.
    pub country: String,
    pub request_id: String,
}

impl RequestDescriptor {
    /// Buffer `request` and build its descriptor.
    pub async fn from_request(
        request: Request<Body>,
        public_scheme: &str,
        geo: &GeoConfig,
        max_body_size: usize,
    ) -> Result<Self, GatewayError> {
        let (parts, body) = request.into_parts();

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > max_body_size) {
            return Err(GatewayError::PayloadTooLarge(max_body_size));
        }

        let body = match Limited::new(body, max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(GatewayError::PayloadTooLarge(max_body_size));
            }
            Err(e) => return Err(GatewayError::InvalidRequest(format!("body read failed: {}", e))),
        };

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = Url::parse(&format!("{}://{}{}", public_scheme, host, path_and_query))
            .map_err(|e| GatewayError::InvalidRequest(format!("bad request target: {}", e)))?;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client_ip = client_ip(&parts.headers, peer, geo);

        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            method: parts.method,
            url,
            headers: parts.headers,
            body,
            client_ip,
            country: String::new(),
            request_id,
        })
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query, as forwarded to an origin.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT).unwrap_or("")
    }

    /// Tag the request with its country code.
    pub fn tag_country(&mut self, geo: &GeoConfig) {
        self.country = country_code(&self.headers, geo);
    }
}

/// Client identity: the configured client-IP header, else the socket address.
///
/// Without a configured header, request headers are never consulted.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, geo: &GeoConfig) -> String {
    geo.client_ip_header
        .as_deref()
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Two-letter country code from the geolocation header, else the fallback.
pub fn country_code(headers: &HeaderMap, geo: &GeoConfig) -> String {
    headers
        .get(geo.country_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| v.len() == 2 && v.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| geo.fallback_country.clone())
}
