use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use jobwire_core::dedup::DedupGuard;
use serde::Serialize;

pub const ALIVE_TEXT: &str = "jobwire is alive";

#[derive(Clone)]
pub struct HealthState {
    guard: DedupGuard,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    /// Channels currently inside the join dedup window.
    pub dedup_in_flight: usize,
    pub checked_at: String,
}

pub fn router(guard: DedupGuard) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health))
        .with_state(HealthState { guard })
}

pub async fn alive() -> &'static str {
    ALIVE_TEXT
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: "jobwire-server",
        dedup_in_flight: state.guard.len(),
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
