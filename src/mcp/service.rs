//! MCP service
//!
//! Implements `initialize`, `tools/list` and `tools/call` on top of the shared
//! render pipeline, plus the plain operations behind the `/mcp/*` REST helpers.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::types::*;
use super::workspace::{DiagramSummary, WorkspaceError, WorkspaceManager};
use crate::diagram::{kind, OutputFormat, RenderError};
use crate::render::{PipelineError, RenderService};

/// Session used when a caller does not name one
pub const DEFAULT_SESSION: &str = "default";

const TOOL_NAMES: &str =
    "diagram_type, render_diagram, workspace_create, workspace_update, workspace_get, workspace_list";

/// Base64 rendering of a diagram
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload {
    pub status: &'static str,
    pub format: OutputFormat,
    pub content_type: String,
    pub fingerprint: String,
    pub data_base64: String,
    pub data_url: String,
    pub render_time_ms: u64,
}

/// Result of a syntax check
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub ok: bool,
    pub errors: Vec<CheckIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramMetadata {
    pub diagram_type: &'static str,
    pub confidence: f64,
    pub participants: Vec<String>,
}

/// JSON-RPC failure (code, message)
type RpcFailure = (i32, String);

#[derive(Clone)]
pub struct McpService {
    render: RenderService,
    workspaces: Arc<WorkspaceManager>,
    tools: Arc<Vec<ToolSchema>>,
}

impl McpService {
    pub fn new(render: RenderService, workspaces: Arc<WorkspaceManager>) -> Self {
        Self {
            render,
            workspaces,
            tools: Arc::new(tool_schemas()),
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Handle one JSON-RPC message; notifications produce no response
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let outcome = if request.jsonrpc != JSONRPC_VERSION {
            Err((INVALID_REQUEST, "jsonrpc must be \"2.0\"".to_string()))
        } else {
            self.dispatch(&request.method, request.params).await
        };

        let Some(id) = request.id else {
            if let Err((code, message)) = outcome {
                tracing::debug!(code, %message, "Dropped error for notification");
            }
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::failure(id, code, message),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcFailure> {
        tracing::debug!(method, "MCP request");

        match method {
            "initialize" => {
                let params: InitializeParams = parse_params(params)?.unwrap_or_default();
                to_result(self.initialize(params))
            }
            "tools/list" => to_result(self.list_tools()),
            "tools/call" => {
                let params: ToolsCallParams = parse_params(params)?
                    .ok_or_else(|| (INVALID_PARAMS, "tools/call requires params".to_string()))?;
                to_result(self.call_tool(params).await)
            }
            "ping" => Ok(json!({})),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        }
    }

    pub fn initialize(&self, params: InitializeParams) -> InitializeResult {
        InitializeResult {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: true },
            },
        }
    }

    pub fn list_tools(&self) -> ToolsListResult {
        ToolsListResult {
            tools: self.tools.as_ref().clone(),
            next_cursor: None,
        }
    }

    pub async fn call_tool(&self, params: ToolsCallParams) -> ToolsCallResult {
        let args = params.arguments.unwrap_or(Value::Null);
        let session = str_arg(&args, "sessionId").unwrap_or(DEFAULT_SESSION);

        match params.name.as_str() {
            "diagram_type" => {
                let Some(source) = required(&args, "source") else {
                    return missing("source");
                };
                let detected = kind::detect(source);
                ToolsCallResult::json(json!({
                    "diagramType": detected.diagram_type,
                    "confidence": detected.confidence,
                    "sourceLength": source.chars().count(),
                }))
            }
            "render_diagram" => {
                let Some(source) = required(&args, "source") else {
                    return missing("source");
                };
                let format = match str_arg(&args, "format").unwrap_or("svg").parse::<OutputFormat>() {
                    Ok(format) => format,
                    Err(e) => return ToolsCallResult::error(format!("Error: {}", e)),
                };
                match self.render_base64(source, format).await {
                    Ok(payload) => tool_json(&payload),
                    Err(e) if e.is_client_error() => {
                        ToolsCallResult::error(format!("Error rendering diagram: {}", e))
                    }
                    Err(e) => render_failure(&e),
                }
            }
            "workspace_create" => {
                let (Some(name), Some(source)) = (required(&args, "name"), required(&args, "source"))
                else {
                    return missing("name' and 'source");
                };
                match self.workspaces.create(session, name, source) {
                    Ok(diagram_id) => ToolsCallResult::json(json!({ "diagramId": diagram_id })),
                    Err(e) => workspace_error(e),
                }
            }
            "workspace_update" => {
                let (Some(diagram_id), Some(source)) =
                    (required(&args, "diagramId"), required(&args, "source"))
                else {
                    return missing("diagramId' and 'source");
                };
                match self.workspaces.update(session, diagram_id, source) {
                    Ok(()) => ToolsCallResult::json(json!({ "diagramId": diagram_id, "updated": true })),
                    Err(e) => workspace_error(e),
                }
            }
            "workspace_get" => {
                let Some(diagram_id) = required(&args, "diagramId") else {
                    return missing("diagramId");
                };
                match self.workspaces.get(session, diagram_id) {
                    Ok(diagram) => tool_json(&diagram),
                    Err(e) => workspace_error(e),
                }
            }
            "workspace_list" => {
                let diagrams: Vec<DiagramSummary> = self.workspaces.list(session);
                ToolsCallResult::json(json!({ "sessionId": session, "diagrams": diagrams }))
            }
            unknown => ToolsCallResult::error(format!(
                "Unknown tool: {}. Available tools: {}",
                unknown, TOOL_NAMES
            )),
        }
    }

    /// Render through the shared coordinator and return the artifact as base64
    pub async fn render_base64(
        &self,
        source: &str,
        format: OutputFormat,
    ) -> Result<RenderPayload, PipelineError> {
        let response = self.render.render(source.as_bytes(), format).await?;
        let rendered = response.rendered;
        let data_base64 = BASE64.encode(&rendered.data);

        Ok(RenderPayload {
            status: "ok",
            format,
            data_url: format!("data:{};base64,{}", format.content_type(), data_base64),
            content_type: rendered.content_type.clone(),
            fingerprint: response.fingerprint.to_hex(),
            data_base64,
            render_time_ms: rendered.render_duration.as_millis() as u64,
        })
    }

    /// Syntax check by rendering; only server-side failures are errors
    pub async fn check(&self, source: &str) -> Result<CheckReport, PipelineError> {
        let issue = match self.render.render(source.as_bytes(), OutputFormat::Svg).await {
            Ok(_) => None,
            Err(PipelineError::Input(e)) => Some(CheckIssue {
                line: None,
                message: e.to_string(),
            }),
            Err(PipelineError::Render(RenderError::Syntax { line, message })) => {
                Some(CheckIssue { line, message })
            }
            Err(e) => return Err(e),
        };

        Ok(CheckReport {
            ok: issue.is_none(),
            errors: issue.into_iter().collect(),
        })
    }

    pub fn metadata(&self, source: &str) -> DiagramMetadata {
        let detected = kind::detect(source);
        DiagramMetadata {
            diagram_type: detected.diagram_type,
            confidence: detected.confidence,
            participants: kind::participants(source),
        }
    }

    pub fn renderer_version(&self) -> &str {
        self.render.renderer_version()
    }

    pub fn max_source_bytes(&self) -> usize {
        self.render.normalizer().max_source_bytes()
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<Option<T>, RpcFailure> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e))),
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| (INTERNAL_ERROR, e.to_string()))
}

fn tool_json<T: Serialize>(value: &T) -> ToolsCallResult {
    match serde_json::to_value(value) {
        Ok(data) => ToolsCallResult::json(data),
        Err(e) => ToolsCallResult::error(format!("Error: {}", e)),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn required<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    str_arg(args, key).filter(|v| !v.trim().is_empty())
}

fn missing(keys: &str) -> ToolsCallResult {
    ToolsCallResult::error(format!(
        "Error: '{}' argument is required and cannot be empty",
        keys
    ))
}

fn render_failure(err: &PipelineError) -> ToolsCallResult {
    let correlation_id = Uuid::new_v4().to_string();
    tracing::error!(correlation_id = %correlation_id, error = %err, "MCP render failed");

    let message = match err {
        PipelineError::Render(RenderError::Timeout(_)) => err.to_string(),
        PipelineError::Render(RenderError::LayoutFault(_) | RenderError::Unavailable(_)) => {
            "The diagram renderer failed".to_string()
        }
        _ => "An internal error occurred".to_string(),
    };
    ToolsCallResult::server_error(message, correlation_id)
}

fn workspace_error(err: WorkspaceError) -> ToolsCallResult {
    ToolsCallResult::error(format!("Error: {}", err))
}

fn tool_schemas() -> Vec<ToolSchema> {
    let session = json!({
        "type": "string",
        "description": "Workspace session identifier (defaults to \"default\")"
    });

    vec![
        ToolSchema {
            name: "diagram_type",
            description: "Detects the main PlantUML diagram type from the given source code. \
                Returns the diagram type (e.g., sequence, class, state, activity) and a confidence score.",
            input_schema: json!({
                "type": "object",
                "required": ["source"],
                "properties": {
                    "source": { "type": "string", "description": "PlantUML diagram source code" }
                },
                "additionalProperties": false
            }),
        },
        ToolSchema {
            name: "render_diagram",
            description: "Renders PlantUML source and returns the artifact as base64.",
            input_schema: json!({
                "type": "object",
                "required": ["source"],
                "properties": {
                    "source": { "type": "string", "description": "PlantUML diagram source code" },
                    "format": { "type": "string", "enum": ["svg", "png", "pdf", "txt"] }
                },
                "additionalProperties": false
            }),
        },
        ToolSchema {
            name: "workspace_create",
            description: "Stores a named diagram in the session workspace and returns its id.",
            input_schema: json!({
                "type": "object",
                "required": ["name", "source"],
                "properties": {
                    "sessionId": session,
                    "name": { "type": "string" },
                    "source": { "type": "string" }
                }
            }),
        },
        ToolSchema {
            name: "workspace_update",
            description: "Replaces the source of a workspace diagram.",
            input_schema: json!({
                "type": "object",
                "required": ["diagramId", "source"],
                "properties": {
                    "sessionId": session,
                    "diagramId": { "type": "string" },
                    "source": { "type": "string" }
                }
            }),
        },
        ToolSchema {
            name: "workspace_get",
            description: "Returns a workspace diagram with its source.",
            input_schema: json!({
                "type": "object",
                "required": ["diagramId"],
                "properties": {
                    "sessionId": session,
                    "diagramId": { "type": "string" }
                }
            }),
        },
        ToolSchema {
            name: "workspace_list",
            description: "Lists the diagrams of a session workspace.",
            input_schema: json!({
                "type": "object",
                "properties": { "sessionId": session }
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramSource, Normalizer, RenderedDiagram};
    use crate::render::{CoordinatorConfig, DiagramRenderer, RenderCache};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Echoes the source; `!!` anywhere in it is reported as a syntax error on
    /// line 2 and `crash` as a layout fault naming an internal path
    struct ScriptedRenderer;

    #[async_trait]
    impl DiagramRenderer for ScriptedRenderer {
        fn version_tag(&self) -> &str {
            "scripted"
        }

        async fn render(&self, source: &DiagramSource) -> Result<RenderedDiagram, RenderError> {
            if source.text().contains("crash") {
                return Err(RenderError::LayoutFault(
                    "/opt/plantuml/bin/dot exited with signal 11".to_string(),
                ));
            }
            if source.text().contains("!!") {
                return Err(RenderError::Syntax {
                    line: Some(2),
                    message: "Syntax Error?".to_string(),
                });
            }
            Ok(RenderedDiagram::new(
                source.text().as_bytes().to_vec(),
                source.format(),
                Duration::from_millis(3),
            ))
        }
    }

    fn service() -> McpService {
        let render = RenderService::new(
            Normalizer::new(1024),
            RenderCache::default(),
            CoordinatorConfig::default(),
            Arc::new(ScriptedRenderer),
        );
        McpService::new(render, Arc::new(WorkspaceManager::new(2)))
    }

    fn request(id: Option<Value>, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params: Some(params),
        }
    }

    async fn call(service: &McpService, name: &str, arguments: Value) -> ToolsCallResult {
        service
            .call_tool(ToolsCallParams {
                name: name.to_string(),
                arguments: Some(arguments),
            })
            .await
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let service = service();
        let response = service
            .handle(request(
                Some(json!(1)),
                "initialize",
                json!({ "protocolVersion": "2024-11-05" }),
            ))
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "plantuml-mcp-server");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
    }

    #[tokio::test]
    async fn test_initialize_default_protocol_version() {
        let result = service().initialize(InitializeParams::default());
        assert_eq!(result.protocol_version, "2025-06-18");
        assert_eq!(result.server_info.version, "1.0.0");
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let service = service();
        let response = service
            .handle(request(None, "notifications/initialized", json!({})))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = service()
            .handle(request(Some(json!("a")), "resources/list", json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call_without_name_is_invalid_params() {
        let response = service()
            .handle(request(Some(json!(2)), "tools/call", json!({ "arguments": {} })))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_list_tools() {
        let names: Vec<_> = service().list_tools().tools.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "diagram_type",
                "render_diagram",
                "workspace_create",
                "workspace_update",
                "workspace_get",
                "workspace_list"
            ]
        );
    }

    #[tokio::test]
    async fn test_diagram_type_tool() {
        let result = call(&service(), "diagram_type", json!({ "source": "@startmindmap\n* root\n@endmindmap" })).await;
        assert!(!result.is_error);
        assert_eq!(result.content[0].kind, "json");
        assert_eq!(result.content[0].data["diagramType"], "mindmap");
        assert_eq!(result.content[0].data["confidence"], 0.95);
    }

    #[tokio::test]
    async fn test_diagram_type_requires_source() {
        let result = call(&service(), "diagram_type", json!({ "source": "" })).await;
        assert!(result.is_error);
        assert_eq!(result.content[0].kind, "text");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = call(&service(), "explode", json!({})).await;
        assert!(result.is_error);
        let message = result.content[0].data["message"].as_str().unwrap();
        assert!(message.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_render_diagram_tool() {
        let result = call(&service(), "render_diagram", json!({ "source": "A -> B", "format": "txt" })).await;
        assert!(!result.is_error);

        let data = &result.content[0].data;
        assert_eq!(data["format"], "txt");
        let decoded = BASE64.decode(data["dataBase64"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"@startuml\nA -> B\n@enduml");
    }

    #[tokio::test]
    async fn test_render_diagram_syntax_error_keeps_details() {
        let result = call(&service(), "render_diagram", json!({ "source": "A -> B\n!!" })).await;
        assert!(result.is_error);

        let data = &result.content[0].data;
        assert!(data["message"].as_str().unwrap().contains("Syntax Error?"));
        assert!(data.get("correlationId").is_none());
    }

    #[tokio::test]
    async fn test_render_diagram_fault_hides_details() {
        let result = call(&service(), "render_diagram", json!({ "source": "A -> B: crash" })).await;
        assert!(result.is_error);

        let data = &result.content[0].data;
        let message = data["message"].as_str().unwrap();
        assert_eq!(message, "The diagram renderer failed");
        assert!(!message.contains("/opt/plantuml"));
        let correlation_id = data["correlationId"].as_str().unwrap();
        assert!(Uuid::parse_str(correlation_id).is_ok());
    }

    #[tokio::test]
    async fn test_render_diagram_bad_format() {
        let result = call(&service(), "render_diagram", json!({ "source": "A -> B", "format": "gif" })).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_workspace_tools() {
        let service = service();
        let created = call(&service, "workspace_create", json!({ "sessionId": "s", "name": "flow", "source": "A -> B" })).await;
        assert_eq!(created.content[0].data["diagramId"], "w1");

        let updated = call(&service, "workspace_update", json!({ "sessionId": "s", "diagramId": "w1", "source": "A -> C" })).await;
        assert!(!updated.is_error);

        let fetched = call(&service, "workspace_get", json!({ "sessionId": "s", "diagramId": "w1" })).await;
        assert_eq!(fetched.content[0].data["source"], "A -> C");

        let listed = call(&service, "workspace_list", json!({ "sessionId": "s" })).await;
        assert_eq!(listed.content[0].data["diagrams"][0]["name"], "flow");

        let missing = call(&service, "workspace_get", json!({ "sessionId": "other", "diagramId": "w1" })).await;
        assert!(missing.is_error);
    }

    #[tokio::test]
    async fn test_workspace_limit_reported() {
        let service = service();
        for _ in 0..2 {
            call(&service, "workspace_create", json!({ "name": "d", "source": "A -> B" })).await;
        }
        let result = call(&service, "workspace_create", json!({ "name": "d", "source": "A -> B" })).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_check_reports_syntax_error() {
        let service = service();

        let report = service.check("A -> B").await.unwrap();
        assert!(report.ok);

        let report = service.check("A -> B\n!!").await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.errors[0].line, Some(2));

        let report = service.check("   ").await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.errors[0].line, None);
    }

    #[tokio::test]
    async fn test_metadata() {
        let metadata = service().metadata("participant Alice\nAlice -> Bob: hi");
        assert_eq!(metadata.diagram_type, "sequence");
        assert_eq!(metadata.participants, vec!["Alice", "Bob"]);
    }
}
