//! PlantUML Server
//!
//! Renders PlantUML diagrams over HTTP, caching artifacts by content
//! fingerprint and collapsing concurrent identical requests into one render.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plantuml_server::config::Config;
use plantuml_server::render::{CommandRenderer, RenderCache};
use plantuml_server::state::AppState;

/// Upper bound on the interval between expired-entry sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "plantuml_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting PlantUML Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Renderer command: {} {}", config.render.command, config.render.args.join(" "));

    let version = match config.render.version.clone() {
        Some(version) => version,
        None => CommandRenderer::detect_version(&config.render.command, &config.render.args)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Could not detect renderer version: {}", e);
                "unknown".to_string()
            }),
    };
    tracing::info!("Renderer version: {}", version);

    let renderer = CommandRenderer::new(
        config.render.command.clone(),
        config.render.args.clone(),
        version,
    );

    let app_state = AppState::new(config.clone(), Arc::new(renderer));

    if config.mcp.enabled {
        tracing::info!(
            "MCP endpoint enabled{}",
            if config.mcp.api_key.is_empty() {
                " (no authentication)"
            } else {
                " (with API key authentication)"
            }
        );
    }

    spawn_cache_sweeper(app_state.render().cache().clone());

    let app = plantuml_server::app(app_state);

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.server.host, config.server.port))?;
    tracing::info!("PlantUML Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop cache entries past their TTL
fn spawn_cache_sweeper(cache: RenderCache) {
    let period = cache
        .config()
        .ttl
        .min(MAX_SWEEP_INTERVAL)
        .max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "Swept expired cache entries");
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
