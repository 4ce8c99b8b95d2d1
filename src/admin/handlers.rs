use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::actor::session::{Attributes, SessionRecord};
use crate::admin::AdminState;
use crate::cache::CacheStats;
use crate::health::CheckResult;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct CounterValue {
    pub identity: String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct SessionValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRecord>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Last health check per origin. Informational; routing ignores it.
pub async fn get_origins(State(state): State<AdminState>) -> Json<Vec<CheckResult>> {
    Json(state.health.snapshot())
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

pub async fn increment_counter(
    State(state): State<AdminState>,
    Path(identity): Path<String>,
) -> Result<Json<CounterValue>, StatusCode> {
    match state.counters.increment(&identity).await {
        Ok(count) => Ok(Json(CounterValue { identity, count })),
        Err(e) => {
            tracing::error!(error = %e, "Counter actor unavailable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

pub async fn create_session(
    State(state): State<AdminState>,
    attributes: Option<Json<Attributes>>,
) -> Result<(StatusCode, Json<SessionRecord>), StatusCode> {
    let attributes = attributes.map(|Json(a)| a).unwrap_or_default();
    match state.sessions.create(attributes).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => {
            tracing::error!(error = %e, "Session actor unavailable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

pub async fn validate_session(
    State(state): State<AdminState>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<SessionValidation>), StatusCode> {
    match state.sessions.validate(&session_id).await {
        Ok(Some(record)) => Ok((
            StatusCode::OK,
            Json(SessionValidation {
                valid: true,
                session: Some(record),
            }),
        )),
        Ok(None) => Ok((
            StatusCode::NOT_FOUND,
            Json(SessionValidation {
                valid: false,
                session: None,
            }),
        )),
        Err(e) => {
            tracing::error!(error = %e, "Session actor unavailable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
