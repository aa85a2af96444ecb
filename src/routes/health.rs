use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
}

/// Root health route, cheap enough for load-balancer probes.
pub fn root_router() -> Router<AppState> {
    Router::new().route("/health", get(basic_health))
}

/// API health route with database connectivity.
pub fn api_router() -> Router<AppState> {
    Router::new().route("/health", get(detailed_health))
}

async fn basic_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database: "unknown",
    })
}

async fn detailed_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.db.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}
