//! Error types for the PlantUML server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::diagram::{NormalizationError, RenderError};
use crate::mcp::WorkspaceError;
use crate::render::PipelineError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Input(#[from] NormalizationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Input(e) => AppError::Input(e),
            PipelineError::Render(e) => AppError::Render(e),
        }
    }
}

impl From<WorkspaceError> for AppError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::DiagramNotFound(_) => AppError::NotFound(err.to_string()),
            WorkspaceError::LimitReached { .. } | WorkspaceError::InvalidName => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// 1-based source line of a syntax error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Input(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Render(RenderError::Syntax { .. }) => StatusCode::BAD_REQUEST,
            AppError::Render(RenderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Render(RenderError::LayoutFault(_) | RenderError::Unavailable(_)) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Render(RenderError::Internal(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Input(NormalizationError::PayloadTooLarge { .. }) => "payload_too_large",
            AppError::Input(NormalizationError::UnsupportedFormat(_)) => "unsupported_format",
            AppError::Input(NormalizationError::InvalidEncoding(_)) => "invalid_encoding",
            AppError::Input(NormalizationError::EmptySource) => "empty_source",
            AppError::Input(NormalizationError::InvalidEncodedSource(_)) => "invalid_encoded_source",
            AppError::Render(RenderError::Syntax { .. }) => "syntax_error",
            AppError::Render(RenderError::Timeout(_)) => "render_timeout",
            AppError::Render(RenderError::LayoutFault(_)) => "render_failed",
            AppError::Render(RenderError::Unavailable(_)) => "renderer_unavailable",
            AppError::Render(RenderError::Internal(_)) | AppError::Internal(_) => "internal_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = self.error_type();

        let body = if status.is_server_error() {
            // Details stay in the log, the client only gets the id to quote
            let correlation_id = Uuid::new_v4().to_string();
            tracing::error!(
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %self,
                "Request failed"
            );
            let message = match &self {
                AppError::Render(RenderError::Timeout(_)) => self.to_string(),
                AppError::Render(RenderError::LayoutFault(_) | RenderError::Unavailable(_)) => {
                    "The diagram renderer failed".to_string()
                }
                _ => "An internal error occurred".to_string(),
            };
            ErrorResponse {
                error: error_type.to_string(),
                message,
                line: None,
                correlation_id: Some(correlation_id),
            }
        } else {
            let line = match &self {
                AppError::Render(RenderError::Syntax { line, .. }) => *line,
                _ => None,
            };
            ErrorResponse {
                error: error_type.to_string(),
                message: self.to_string(),
                line,
                correlation_id: None,
            }
        };

        (status, Json(body)).into_response()
    }
}
