//! In-memory diagram workspaces
//!
//! Each MCP session owns a workspace of named diagrams. Diagram ids are
//! allocated per session as `w1`, `w2`, ... and never reused.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

/// Default number of diagrams a session may hold
pub const DEFAULT_WORKSPACE_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("Workspace limit of {limit} diagrams reached")]
    LimitReached { limit: usize },

    #[error("Diagram not found: {0}")]
    DiagramNotFound(String),

    #[error("Diagram name cannot be empty")]
    InvalidName,
}

/// A stored diagram
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDiagram {
    pub diagram_id: String,
    pub name: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry returned by [`WorkspaceManager::list`]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSummary {
    pub diagram_id: String,
    pub name: String,
}

#[derive(Default)]
struct Workspace {
    next_id: u64,
    diagrams: BTreeMap<u64, WorkspaceDiagram>,
}

/// Session-scoped diagram stores
pub struct WorkspaceManager {
    sessions: RwLock<HashMap<String, Workspace>>,
    limit: usize,
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new(DEFAULT_WORKSPACE_LIMIT)
    }
}

impl WorkspaceManager {
    pub fn new(limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Store a new diagram and return its id
    pub fn create(&self, session_id: &str, name: &str, source: &str) -> Result<String, WorkspaceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::InvalidName);
        }

        let mut sessions = self.sessions.write();
        let workspace = sessions.entry(session_id.to_string()).or_default();
        if workspace.diagrams.len() >= self.limit {
            return Err(WorkspaceError::LimitReached { limit: self.limit });
        }

        workspace.next_id += 1;
        let number = workspace.next_id;
        let diagram_id = format!("w{}", number);
        let now = Utc::now();
        workspace.diagrams.insert(
            number,
            WorkspaceDiagram {
                diagram_id: diagram_id.clone(),
                name: name.to_string(),
                source: source.to_string(),
                created_at: now,
                updated_at: now,
            },
        );

        tracing::debug!(session = session_id, diagram_id = %diagram_id, "Workspace diagram created");
        Ok(diagram_id)
    }

    /// Replace the source of an existing diagram
    pub fn update(&self, session_id: &str, diagram_id: &str, source: &str) -> Result<(), WorkspaceError> {
        let not_found = || WorkspaceError::DiagramNotFound(diagram_id.to_string());
        let number = parse_id(diagram_id).ok_or_else(not_found)?;

        let mut sessions = self.sessions.write();
        let diagram = sessions
            .get_mut(session_id)
            .and_then(|w| w.diagrams.get_mut(&number))
            .ok_or_else(not_found)?;

        diagram.source = source.to_string();
        diagram.updated_at = Utc::now();
        Ok(())
    }

    pub fn get(&self, session_id: &str, diagram_id: &str) -> Result<WorkspaceDiagram, WorkspaceError> {
        let not_found = || WorkspaceError::DiagramNotFound(diagram_id.to_string());
        let number = parse_id(diagram_id).ok_or_else(not_found)?;

        self.sessions
            .read()
            .get(session_id)
            .and_then(|w| w.diagrams.get(&number))
            .cloned()
            .ok_or_else(not_found)
    }

    /// Diagrams of a session in creation order (empty for unknown sessions)
    pub fn list(&self, session_id: &str) -> Vec<DiagramSummary> {
        self.sessions
            .read()
            .get(session_id)
            .map(|w| {
                w.diagrams
                    .values()
                    .map(|d| DiagramSummary {
                        diagram_id: d.diagram_id.clone(),
                        name: d.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_id(diagram_id: &str) -> Option<u64> {
    diagram_id.trim().strip_prefix('w')?.parse().ok()
}
