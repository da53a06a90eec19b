//! Render pipeline
//!
//! Normalizer → fingerprint → coordinator (→ renderer on a miss). This is the
//! single entry point the HTTP and MCP handlers use to turn raw diagram text
//! into an artifact.

use std::sync::Arc;

use thiserror::Error;

use super::cache::RenderCache;
use super::coordinator::{CoordinatorConfig, RenderCoordinator, RenderOutcome};
use super::renderer::DiagramRenderer;
use crate::diagram::{
    fingerprint, DiagramSource, Fingerprint, NormalizationError, Normalizer, OutputFormat,
    RenderError, RenderedDiagram,
};

/// Pipeline error: either the input was rejected or the render failed
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] NormalizationError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Whether the caller can fix the failure by changing the diagram
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::Input(_) => true,
            PipelineError::Render(e) => e.is_client_error(),
        }
    }
}

/// A rendered artifact together with the fingerprint it was resolved under
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub fingerprint: Fingerprint,
    pub rendered: Arc<RenderedDiagram>,
}

/// Shared render pipeline
///
/// Constructed once at startup and handed to request handlers through the
/// application state; tests build a fresh instance with a stub renderer.
#[derive(Clone)]
pub struct RenderService {
    normalizer: Normalizer,
    coordinator: RenderCoordinator,
    renderer: Arc<dyn DiagramRenderer>,
}

impl RenderService {
    pub fn new(
        normalizer: Normalizer,
        cache: RenderCache,
        coordinator_config: CoordinatorConfig,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Self {
        Self {
            normalizer,
            coordinator: RenderCoordinator::new(cache, coordinator_config),
            renderer,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn coordinator(&self) -> &RenderCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &RenderCache {
        self.coordinator.cache()
    }

    pub fn renderer_version(&self) -> &str {
        self.renderer.version_tag()
    }

    /// Validate raw bytes and compute their fingerprint without rendering
    pub fn prepare(
        &self,
        raw: &[u8],
        format: OutputFormat,
    ) -> Result<(DiagramSource, Fingerprint), NormalizationError> {
        let source = self.normalizer.normalize(raw, format)?;
        let fingerprint = fingerprint(&source, self.renderer.version_tag());
        Ok((source, fingerprint))
    }

    /// Render raw diagram bytes in the requested format
    pub async fn render(
        &self,
        raw: &[u8],
        format: OutputFormat,
    ) -> Result<RenderedResponse, PipelineError> {
        let (source, fingerprint) = self.prepare(raw, format)?;
        let rendered = self.render_source(source, fingerprint).await?;
        Ok(RenderedResponse {
            fingerprint,
            rendered,
        })
    }

    /// Resolve an already prepared source through the coordinator
    pub async fn render_source(
        &self,
        source: DiagramSource,
        fingerprint: Fingerprint,
    ) -> RenderOutcome {
        let renderer = Arc::clone(&self.renderer);
        self.coordinator
            .resolve(fingerprint, move || async move { renderer.render(&source).await })
            .await
    }
}
