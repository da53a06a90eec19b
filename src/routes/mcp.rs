//! MCP endpoints
//!
//! `POST /mcp` speaks JSON-RPC 2.0; the remaining routes are plain JSON
//! helpers over the same tools. Everything here is gated by
//! `PLANTUML_MCP_ENABLED` and, when configured, a bearer API key.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::diagram::OutputFormat;
use crate::error::{AppError, Result};
use crate::mcp::types::{INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::workspace::WorkspaceDiagram;
use crate::mcp::{
    CheckReport, DiagramMetadata, JsonRpcRequest, JsonRpcResponse, RenderPayload, DEFAULT_SESSION,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub source: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCreateRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub name: String,
    pub source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePutRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub diagram_id: String,
    pub source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDiagramRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub diagram_id: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceListRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub plantuml_core_version: String,
    pub limit_size: usize,
    pub workspace_limit: usize,
    pub formats: Vec<OutputFormat>,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(endpoint_status).post(json_rpc))
        .route("/info", get(info))
        .route("/check", post(check))
        .route("/render", post(render))
        .route("/metadata", post(metadata))
        .route("/workspace/create", post(workspace_create))
        .route("/workspace/put", post(workspace_put))
        .route("/workspace/get", post(workspace_get))
        .route("/workspace/list", post(workspace_list))
        .route("/workspace/render", post(workspace_render))
        .route_layer(middleware::from_fn_with_state(state, require_access))
}

/// Reject requests while MCP is disabled or the bearer token is wrong
async fn require_access(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let mcp = &state.config().mcp;
    if !mcp.enabled {
        return Err(AppError::NotFound(
            "MCP API is not enabled. Set PLANTUML_MCP_ENABLED=true to enable.".to_string(),
        ));
    }

    if !mcp.api_key.is_empty() {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| {
                AppError::Unauthorized(
                    "Missing or invalid Authorization header. Expected: Bearer <token>".to_string(),
                )
            })?;

        if token != mcp.api_key {
            tracing::warn!(path = %request.uri().path(), "Rejected MCP request with invalid API key");
            return Err(AppError::Unauthorized("Invalid API key".to_string()));
        }
    }

    Ok(next.run(request).await)
}

async fn endpoint_status() -> &'static str {
    "PlantUML MCP endpoint is up."
}

/// JSON-RPC entry point, single messages or batches
async fn json_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed JSON-RPC payload");
            return rpc_error(PARSE_ERROR, format!("Parse error: {}", e));
        }
    };

    match message {
        Value::Array(batch) if !batch.is_empty() => {
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                match serde_json::from_value::<JsonRpcRequest>(item) {
                    Ok(request) => responses.extend(state.mcp().handle(request).await),
                    Err(e) => responses.push(JsonRpcResponse::failure(
                        Value::Null,
                        INVALID_REQUEST,
                        format!("Invalid request: {}", e),
                    )),
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        Value::Object(_) => match serde_json::from_value::<JsonRpcRequest>(message) {
            Ok(request) => match state.mcp().handle(request).await {
                Some(response) => Json(response).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            },
            Err(e) => rpc_error(INVALID_REQUEST, format!("Invalid request: {}", e)),
        },
        _ => rpc_error(INVALID_REQUEST, "Invalid request: expected an object or a batch"),
    }
}

fn rpc_error(code: i32, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(JsonRpcResponse::failure(Value::Null, code, message)),
    )
        .into_response()
}

async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let mcp = state.mcp();
    Json(InfoResponse {
        plantuml_core_version: mcp.renderer_version().to_string(),
        limit_size: mcp.max_source_bytes(),
        workspace_limit: mcp.workspaces().limit(),
        formats: OutputFormat::ALL.to_vec(),
    })
}

async fn check(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<CheckReport>> {
    Ok(Json(state.mcp().check(&request.source).await?))
}

async fn render(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<RenderPayload>> {
    let format = parse_format(request.format.as_deref())?;
    Ok(Json(state.mcp().render_base64(&request.source, format).await?))
}

async fn metadata(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<DiagramMetadata>> {
    if request.source.trim().is_empty() {
        return Err(AppError::BadRequest("'source' cannot be empty".to_string()));
    }
    Ok(Json(state.mcp().metadata(&request.source)))
}

async fn workspace_create(
    State(state): State<AppState>,
    Json(request): Json<WorkspaceCreateRequest>,
) -> Result<Json<Value>> {
    let session = session_or_default(request.session_id.as_deref());
    let diagram_id = state
        .mcp()
        .workspaces()
        .create(session, &request.name, &request.source)?;
    Ok(Json(json!({ "sessionId": session, "diagramId": diagram_id })))
}

async fn workspace_put(
    State(state): State<AppState>,
    Json(request): Json<WorkspacePutRequest>,
) -> Result<Json<Value>> {
    let session = session_or_default(request.session_id.as_deref());
    state
        .mcp()
        .workspaces()
        .update(session, &request.diagram_id, &request.source)?;
    Ok(Json(json!({ "diagramId": request.diagram_id, "updated": true })))
}

async fn workspace_get(
    State(state): State<AppState>,
    Json(request): Json<WorkspaceDiagramRequest>,
) -> Result<Json<WorkspaceDiagram>> {
    let session = session_or_default(request.session_id.as_deref());
    Ok(Json(state.mcp().workspaces().get(session, &request.diagram_id)?))
}

async fn workspace_list(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    // An empty body lists the default session
    let request: WorkspaceListRequest = if body.is_empty() {
        WorkspaceListRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    let session = session_or_default(request.session_id.as_deref());
    let diagrams = state.mcp().workspaces().list(session);
    Ok(Json(json!({ "sessionId": session, "diagrams": diagrams })))
}

async fn workspace_render(
    State(state): State<AppState>,
    Json(request): Json<WorkspaceDiagramRequest>,
) -> Result<Json<RenderPayload>> {
    let session = session_or_default(request.session_id.as_deref());
    let format = parse_format(request.format.as_deref())?;
    let diagram = state.mcp().workspaces().get(session, &request.diagram_id)?;
    let payload = state.mcp().render_base64(&diagram.source, format).await?;
    Ok(Json(payload))
}

fn parse_format(format: Option<&str>) -> Result<OutputFormat> {
    Ok(format.unwrap_or("svg").parse()?)
}

fn session_or_default(session_id: Option<&str>) -> &str {
    session_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
}
