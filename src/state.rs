//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::diagram::Normalizer;
use crate::mcp::{McpService, WorkspaceManager};
use crate::render::{DiagramRenderer, RenderCache, RenderService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    render: RenderService,
    mcp: McpService,
}

impl AppState {
    /// Create the application state around a renderer
    ///
    /// The cache and in-flight registry live inside the render service, so
    /// every handler and the MCP tools share one instance.
    pub fn new(config: Config, renderer: Arc<dyn DiagramRenderer>) -> Self {
        let render = RenderService::new(
            Normalizer::new(config.render.max_source_bytes),
            RenderCache::new(config.cache.clone()),
            config.render.coordinator(),
            renderer,
        );
        let workspaces = Arc::new(WorkspaceManager::new(config.mcp.workspace_limit));
        let mcp = McpService::new(render.clone(), workspaces);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                render,
                mcp,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the render pipeline
    pub fn render(&self) -> &RenderService {
        &self.inner.render
    }

    /// Get the MCP service
    pub fn mcp(&self) -> &McpService {
        &self.inner.mcp
    }
}
