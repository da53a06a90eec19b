//! Rendering
//!
//! - `cache`: fingerprint → artifact cache with LRU/TTL eviction
//! - `coordinator`: at-most-one in-flight render per fingerprint
//! - `renderer`: adapters for the external layout engine
//! - `service`: the request-facing pipeline tying them together

pub mod cache;
pub mod coordinator;
pub mod renderer;
pub mod service;

pub use cache::{CacheConfig, CacheStats, RenderCache};
pub use coordinator::{CoordinatorConfig, CoordinatorStats, RenderCoordinator, RenderOutcome};
pub use renderer::{CommandRenderer, DiagramRenderer};
pub use service::{PipelineError, RenderService, RenderedResponse};
