//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::config::EngineKind;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub engine_kind: EngineKind,
    pub engine_connected: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "office-docs-server",
        engine_kind: state.config().engine.kind,
        engine_connected: state.service().engine_connected(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
