//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;

use plantuml_server::config::Config;
use plantuml_server::diagram::{DiagramSource, OutputFormat, RenderError, RenderedDiagram};
use plantuml_server::render::DiagramRenderer;
use plantuml_server::state::AppState;

pub const MAX_SOURCE_BYTES: usize = 4096;

/// Renderer double that counts invocations
///
/// Sources containing `!!syntax` fail with a syntax error on line 2 and
/// sources containing `!!crash` fail with a layout fault.
pub struct StubRenderer {
    calls: AtomicUsize,
    delay: Duration,
}

impl StubRenderer {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagramRenderer for StubRenderer {
    fn version_tag(&self) -> &str {
        "stub-1.0"
    }

    async fn render(&self, source: &DiagramSource) -> Result<RenderedDiagram, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let text = source.text();
        if text.contains("!!syntax") {
            return Err(RenderError::Syntax {
                line: Some(2),
                message: "Syntax Error?".to_string(),
            });
        }
        if text.contains("!!crash") {
            return Err(RenderError::LayoutFault("stub crashed".to_string()));
        }

        let data = match source.format() {
            OutputFormat::Svg => format!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\"><!-- {} --></svg>",
                text
            )
            .into_bytes(),
            _ => text.as_bytes().to_vec(),
        };

        Ok(RenderedDiagram::new(data, source.format(), Duration::from_millis(5)))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.render.max_source_bytes = MAX_SOURCE_BYTES;
    config
}

pub fn mcp_config(api_key: &str) -> Config {
    let mut config = test_config();
    config.mcp.enabled = true;
    config.mcp.api_key = api_key.to_string();
    config.mcp.workspace_limit = 3;
    config
}

pub fn test_app(config: Config, renderer: Arc<StubRenderer>) -> Router {
    plantuml_server::app(AppState::new(config, renderer))
}

pub fn test_server(config: Config, renderer: Arc<StubRenderer>) -> TestServer {
    TestServer::new(test_app(config, renderer)).unwrap()
}
