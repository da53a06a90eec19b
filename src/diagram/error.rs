//! Diagram error types
//!
//! Input errors are raised before any render is attempted. Render errors are
//! broadcast to every waiter of a fingerprint, so they must be `Clone`.

use std::time::Duration;

use thiserror::Error;

/// Client-caused input errors (never retried by the server)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    /// Raw payload exceeds the configured maximum
    #[error("Diagram source is {size} bytes, maximum is {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Requested output format is not supported
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Bytes could not be decoded as text
    #[error("Invalid source encoding: {0}")]
    InvalidEncoding(String),

    /// Nothing left to render after whitespace normalization
    #[error("Diagram source is empty")]
    EmptySource,

    /// URL-encoded diagram could not be decoded
    #[error("Invalid encoded diagram: {0}")]
    InvalidEncodedSource(String),
}

/// Render failures, surfaced to every waiter and never cached
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Renderer rejected the diagram text
    #[error("Syntax error{}: {message}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Syntax { line: Option<usize>, message: String },

    /// Renderer failed internally
    #[error("Layout engine fault: {0}")]
    LayoutFault(String),

    /// Render exceeded the configured timeout
    #[error("Render timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// Renderer could not be started
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    /// Coordinator or task fault
    #[error("Internal render error: {0}")]
    Internal(String),
}

impl RenderError {
    /// Whether the failure was caused by the diagram text itself
    pub fn is_client_error(&self) -> bool {
        matches!(self, RenderError::Syntax { .. })
    }
}

/// Result type alias for render operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = RenderError::Syntax {
            line: Some(3),
            message: "Syntax Error?".to_string(),
        };
        assert_eq!(err.to_string(), "Syntax error at line 3: Syntax Error?");

        let err = RenderError::Syntax {
            line: None,
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "Syntax error: bad");
    }

    #[test]
    fn test_timeout_display() {
        let err = RenderError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Render timed out after 1500 ms");
    }
}
