//! Diagram sources
//!
//! Everything that happens to a diagram before it reaches the renderer:
//! decoding, canonicalization, fingerprinting and kind detection.

pub mod encoding;
pub mod error;
pub mod fingerprint;
pub mod kind;
pub mod normalize;
pub mod types;

pub use error::{NormalizationError, RenderError, RenderResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use kind::DiagramKind;
pub use normalize::Normalizer;
pub use types::{DiagramSource, OutputFormat, RenderedDiagram, SourceEncoding};
