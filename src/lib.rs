//! PlantUML Server Library
//!
//! HTTP rendering service for PlantUML diagrams with a content-addressed
//! artifact cache and at-most-one concurrent render per diagram.
//!
//! # Modules
//!
//! - `diagram`: normalization, fingerprints, URL encoding and kind detection
//! - `render`: cache, render coordinator and renderer adapters
//! - `mcp`: Model Context Protocol tools and workspaces
//! - `routes`: axum handlers

pub mod config;
pub mod diagram;
pub mod error;
pub mod mcp;
pub mod render;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Extra body allowance so oversized sources reach the normalizer and get a
/// structured error instead of a bare 413
const BODY_LIMIT_HEADROOM: usize = 64 * 1024;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let body_limit = state
        .config()
        .render
        .max_source_bytes
        .saturating_mul(2)
        .saturating_add(BODY_LIMIT_HEADROOM);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1/health", routes::health::router())
        .nest("/mcp", routes::mcp::router(state.clone()))
        .merge(routes::render::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
