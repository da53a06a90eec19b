//! Model Context Protocol support
//!
//! - `types`: JSON-RPC envelopes and MCP payloads
//! - `service`: tool dispatch over the shared render pipeline
//! - `workspace`: per-session diagram stores

pub mod service;
pub mod types;
pub mod workspace;

pub use service::{CheckReport, DiagramMetadata, McpService, RenderPayload, DEFAULT_SESSION};
pub use types::{JsonRpcRequest, JsonRpcResponse};
pub use workspace::{WorkspaceError, WorkspaceManager};
