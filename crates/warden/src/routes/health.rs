//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::directory::MembershipDirectory;
use crate::gate::GateStatsSnapshot;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    started: bool,
}

/// Readiness check (has the gate passed its startup checks?)
pub async fn ready_check<D: MembershipDirectory>(
    State(state): State<AppState<D>>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    if state.gate.is_started() {
        Ok(Json(ReadyResponse {
            status: "ready",
            started: true,
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    uptime_secs: u64,
    #[serde(flatten)]
    gate: GateStatsSnapshot,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics<D: MembershipDirectory>(State(state): State<AppState<D>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_secs: state.uptime_secs(),
        gate: state.gate.get_stats().await,
    })
}
