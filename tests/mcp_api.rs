mod common;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};

use common::{mcp_config, test_config, test_server, StubRenderer};

fn enabled_server() -> TestServer {
    test_server(mcp_config(""), StubRenderer::new())
}

async fn rpc(server: &TestServer, body: Value) -> Value {
    let response = server.post("/mcp").json(&body).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

async fn call_tool(server: &TestServer, name: &str, arguments: Value) -> Value {
    let body = rpc(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await;
    body["result"].clone()
}

#[tokio::test]
async fn disabled_endpoint_is_not_found() {
    let server = test_server(test_config(), StubRenderer::new());

    let response = server.get("/mcp").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .post("/mcp")
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("PLANTUML_MCP_ENABLED"));

    let response = server.post("/mcp/render").json(&json!({ "source": "A -> B" })).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_reports_endpoint_up() {
    let server = enabled_server();

    let response = server.get("/mcp").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "PlantUML MCP endpoint is up.");
}

#[tokio::test]
async fn initialize_handshake() {
    let server = enabled_server();

    let body = rpc(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "2025-03-26", "capabilities": {} }
        }),
    )
    .await;

    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "plantuml-mcp-server");
    assert_eq!(body["result"]["serverInfo"]["version"], "1.0.0");
    assert_eq!(body["result"]["capabilities"]["tools"]["listChanged"], true);

    let body = rpc(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "initialize" })).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn notification_is_accepted_without_body() {
    let server = enabled_server();

    let response = server
        .post("/mcp")
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert!(response.as_bytes().is_empty());
}

#[tokio::test]
async fn lists_tools() {
    let server = enabled_server();

    let body = rpc(&server, json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" })).await;

    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
    assert_eq!(tools[0]["name"], "diagram_type");
    assert_eq!(tools[0]["inputSchema"]["required"][0], "source");
}

#[tokio::test]
async fn diagram_type_tool() {
    let server = enabled_server();

    let result = call_tool(
        &server,
        "diagram_type",
        json!({ "source": "@startuml\nclass Foo\ninterface Bar\nFoo implements Bar\n@enduml" }),
    )
    .await;

    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "json");
    assert_eq!(result["content"][0]["data"]["diagramType"], "class");
}

#[tokio::test]
async fn unknown_tool_is_tool_error() {
    let server = enabled_server();

    let result = call_tool(&server, "draw_pony", json!({})).await;

    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["type"], "text");
    let message = result["content"][0]["data"]["message"].as_str().unwrap();
    assert!(message.contains("Unknown tool"));
}

#[tokio::test]
async fn render_tool_shares_http_cache() {
    let renderer = StubRenderer::new();
    let server = test_server(mcp_config(""), renderer.clone());

    let http = server.post("/txt").text("A -> B: shared").await;
    assert_eq!(http.status_code(), StatusCode::OK);

    let result = call_tool(
        &server,
        "render_diagram",
        json!({ "source": "A -> B: shared", "format": "txt" }),
    )
    .await;

    assert_eq!(result["isError"], false);
    let data = &result["content"][0]["data"];
    let decoded = BASE64.decode(data["dataBase64"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, http.as_bytes().to_vec());
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn render_tool_fault_returns_correlation_id_only() {
    let server = enabled_server();

    let result = call_tool(&server, "render_diagram", json!({ "source": "!!crash" })).await;

    assert_eq!(result["isError"], true);
    let data = &result["content"][0]["data"];
    let message = data["message"].as_str().unwrap();
    assert!(!message.contains("stub crashed"));
    assert!(!message.contains("Layout engine fault"));
    assert!(data["correlationId"].is_string());
}

#[tokio::test]
async fn render_tool_syntax_error_keeps_line_details() {
    let server = enabled_server();

    let result = call_tool(&server, "render_diagram", json!({ "source": "A -> B\n!!syntax" })).await;

    assert_eq!(result["isError"], true);
    let data = &result["content"][0]["data"];
    assert!(data["message"].as_str().unwrap().contains("Error rendering diagram"));
    assert!(data.get("correlationId").is_none());
}

#[tokio::test]
async fn malformed_json_is_parse_error() {
    let server = enabled_server();

    let response = server
        .post("/mcp")
        .add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .text("{ not json")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn unknown_method_and_bad_params() {
    let server = enabled_server();

    let body = rpc(&server, json!({ "jsonrpc": "2.0", "id": 4, "method": "prompts/list" })).await;
    assert_eq!(body["error"]["code"], -32601);

    let body = rpc(
        &server,
        json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": { "arguments": {} } }),
    )
    .await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn batch_requests() {
    let server = enabled_server();

    let response = server
        .post("/mcp")
        .json(&json!([
            { "jsonrpc": "2.0", "id": 1, "method": "tools/list" },
            { "jsonrpc": "2.0", "method": "notifications/initialized" },
            { "jsonrpc": "2.0", "id": 2, "method": "ping" }
        ]))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["id"], 2);
}

#[tokio::test]
async fn api_key_is_required_when_configured() {
    let server = test_server(mcp_config("s3cret"), StubRenderer::new());
    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });

    let response = server.post("/mcp").json(&request).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .json(&request)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"))
        .json(&request)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"))
        .json(&request)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn rest_check_reports_errors() {
    let server = enabled_server();

    let response = server.post("/mcp/check").json(&json!({ "source": "A -> B" })).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["errors"].as_array().unwrap().len(), 0);

    let response = server
        .post("/mcp/check")
        .json(&json!({ "source": "A -> B\n!!syntax" }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["errors"][0]["line"], 2);
}

#[tokio::test]
async fn rest_render_and_metadata() {
    let server = enabled_server();

    let response = server
        .post("/mcp/render")
        .json(&json!({ "source": "Alice -> Bob : Hello", "format": "png" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["format"], "png");
    assert!(body["dataUrl"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert!(body["dataBase64"].is_string());

    let response = server
        .post("/mcp/metadata")
        .json(&json!({ "source": "participant Alice\nAlice -> Bob : Hello" }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["diagramType"], "sequence");
    assert_eq!(body["participants"], json!(["Alice", "Bob"]));
}

#[tokio::test]
async fn rest_info() {
    let server = enabled_server();

    let body: Value = server.get("/mcp/info").await.json();

    assert_eq!(body["plantumlCoreVersion"], "stub-1.0");
    assert_eq!(body["limitSize"], 4096);
    assert_eq!(body["formats"], json!(["svg", "png", "pdf", "txt"]));
}

#[tokio::test]
async fn workspace_lifecycle() {
    let server = enabled_server();

    let created: Value = server
        .post("/mcp/workspace/create")
        .json(&json!({ "sessionId": "s1", "name": "login", "source": "User -> App : login" }))
        .await
        .json();
    assert_eq!(created["diagramId"], "w1");

    let response = server
        .post("/mcp/workspace/put")
        .json(&json!({ "sessionId": "s1", "diagramId": "w1", "source": "User -> App : logout" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let fetched: Value = server
        .post("/mcp/workspace/get")
        .json(&json!({ "sessionId": "s1", "diagramId": "w1" }))
        .await
        .json();
    assert_eq!(fetched["name"], "login");
    assert_eq!(fetched["source"], "User -> App : logout");

    let listed: Value = server
        .post("/mcp/workspace/list")
        .json(&json!({ "sessionId": "s1" }))
        .await
        .json();
    assert_eq!(listed["diagrams"][0]["diagramId"], "w1");

    let rendered: Value = server
        .post("/mcp/workspace/render")
        .json(&json!({ "sessionId": "s1", "diagramId": "w1", "format": "txt" }))
        .await
        .json();
    let decoded = BASE64.decode(rendered["dataBase64"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, b"@startuml\nUser -> App : logout\n@enduml");

    let missing = server
        .post("/mcp/workspace/get")
        .json(&json!({ "sessionId": "s2", "diagramId": "w1" }))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn workspace_limit_is_enforced() {
    let server = enabled_server();

    for i in 0..3 {
        let response = server
            .post("/mcp/workspace/create")
            .json(&json!({ "name": format!("d{}", i), "source": "A -> B" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let response = server
        .post("/mcp/workspace/create")
        .json(&json!({ "name": "overflow", "source": "A -> B" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let listed: Value = server.post("/mcp/workspace/list").await.json();
    assert_eq!(listed["sessionId"], "default");
    assert_eq!(listed["diagrams"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn workspace_tools_over_json_rpc() {
    let server = enabled_server();

    let created = call_tool(
        &server,
        "workspace_create",
        json!({ "sessionId": "agent", "name": "flow", "source": "A -> B" }),
    )
    .await;
    assert_eq!(created["content"][0]["data"]["diagramId"], "w1");

    let listed = call_tool(&server, "workspace_list", json!({ "sessionId": "agent" })).await;
    assert_eq!(listed["content"][0]["data"]["diagrams"][0]["name"], "flow");

    // Same store as the REST helpers
    let fetched: Value = server
        .post("/mcp/workspace/get")
        .json(&json!({ "sessionId": "agent", "diagramId": "w1" }))
        .await
        .json();
    assert_eq!(fetched["source"], "A -> B");
}
