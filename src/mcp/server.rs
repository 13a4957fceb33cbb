//! Streamable-HTTP MCP endpoint
//!
//! Every JSON-RPC message is a `POST /mcp`; responses are plain JSON bodies.
//! Notifications are acknowledged with `202 Accepted` and no body.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, SESSION_HEADER, codes,
};
use super::tools::ToolRegistry;
use crate::{Error, Result};

/// Shared state for the MCP handler
pub struct McpState {
    registry: ToolRegistry,
    server_info: Implementation,
}

impl McpState {
    /// Serve `registry`, announcing this crate's name and version
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Build the MCP router
pub fn router(registry: ToolRegistry) -> Router {
    Router::new()
        .route("/mcp", post(handle))
        .with_state(Arc::new(McpState::new(registry)))
}

/// Bind and serve until the task is dropped
///
/// # Errors
///
/// Returns error if the listener cannot bind or the server fails
pub async fn serve(addr: &str, registry: ToolRegistry) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind MCP server on {addr}: {e}")))?;

    tracing::info!(addr, tools = registry.len(), "MCP server listening");

    axum::serve(listener, router(registry).layer(TraceLayer::new_for_http()))
        .await
        .map_err(|e| Error::Mcp(format!("MCP server error: {e}")))?;

    Ok(())
}

async fn handle(State(state): State<Arc<McpState>>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable JSON-RPC body");
            return Json(JsonRpcResponse::failure(
                Value::Null,
                codes::PARSE_ERROR,
                format!("parse error: {e}"),
            ))
            .into_response();
        }
    };

    let Some(id) = request.id.clone() else {
        tracing::debug!(method = %request.method, "notification received");
        return StatusCode::ACCEPTED.into_response();
    };

    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::failure(
            id,
            codes::INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ))
        .into_response();
    }

    tracing::debug!(method = %request.method, "handling request");

    match request.method.as_str() {
        "initialize" => initialize(&state, id),
        "ping" => Json(JsonRpcResponse::success(id, json!({}))).into_response(),
        "tools/list" => {
            let result = ListToolsResult {
                tools: state.registry.definitions(),
            };
            reply(id, &result)
        }
        "tools/call" => call_tool(&state, id, request.params).await,
        other => Json(JsonRpcResponse::failure(
            id,
            codes::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        ))
        .into_response(),
    }
}

fn initialize(state: &McpState, id: Value) -> Response {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: state.server_info.clone(),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session = %session_id, "MCP session initialized");

    let mut response = reply(id, &result);
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn call_tool(state: &McpState, id: Value, params: Option<Value>) -> Response {
    let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
        Ok(Some(params)) => params,
        Ok(None) => {
            return Json(JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                "tools/call requires params",
            ))
            .into_response();
        }
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                format!("invalid params: {e}"),
            ))
            .into_response();
        }
    };

    let Some(tool) = state.registry.get(&params.name) else {
        return Json(JsonRpcResponse::failure(
            id,
            codes::INVALID_PARAMS,
            format!("unknown tool: {}", params.name),
        ))
        .into_response();
    };

    let result = match tool.call(&params.arguments).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(tool = %params.name, error = %e, "tool call failed");
            CallToolResult::error(e.to_string())
        }
    };

    reply(id, &result)
}

fn reply<T: serde::Serialize>(id: Value, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Json(JsonRpcResponse::success(id, value)).into_response(),
        Err(e) => Json(JsonRpcResponse::failure(
            id,
            codes::INTERNAL_ERROR,
            format!("failed to encode result: {e}"),
        ))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::mcp::tools::HelloTool;

    fn app() -> Router {
        let mut registry = ToolRegistry::new();
        registry.register(HelloTool);
        router(registry)
    }

    async fn post_raw(body: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app()
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, session, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_initialize_assigns_session() {
        let (status, session, body) = post_raw(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(session.is_some_and(|s| !s.is_empty()));

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_notification_accepted() {
        let (status, _, body) =
            post_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let (status, _, body) = post_raw("{not json").await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], codes::PARSE_ERROR);
        assert_eq!(json["id"], Value::Null);
    }
}
