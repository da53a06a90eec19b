//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::render::{CacheStats, CoordinatorStats};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub renderer_version: String,
    pub mcp_enabled: bool,
    pub cache: CacheStats,
    pub renders: CoordinatorStats,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let render = state.render();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "plantuml-server",
        renderer_version: render.renderer_version().to_string(),
        mcp_enabled: state.config().mcp.enabled,
        cache: render.cache().stats(),
        renders: render.coordinator().stats(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
