//! Admin API.
//!
//! Served on its own listener, behind bearer-token auth. Exposes the
//! strongly-consistent actors (exact counters, sessions) and read-only
//! views of cache and origin health.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::actor::{CounterRegistry, SessionRegistry};
use crate::cache::CacheManager;
use crate::health::HealthBoard;

#[derive(Clone)]
pub struct AdminState {
    pub api_key: Arc<str>,
    pub cache: Arc<CacheManager>,
    pub health: HealthBoard,
    pub counters: Arc<CounterRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: Instant,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/origins", get(get_origins))
        .route("/admin/cache", get(get_cache))
        .route("/admin/counters/{identity}", post(increment_counter))
        .route("/admin/sessions", post(create_session))
        .route("/admin/sessions/{id}", get(validate_session))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
