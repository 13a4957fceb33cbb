//! Minimal MCP client over streamable HTTP

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use super::protocol::{
    CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, SESSION_HEADER, ToolDefinition,
};
use crate::{Error, Result};

/// Connected MCP client
#[derive(Debug)]
pub struct McpClient {
    client: reqwest::Client,
    url: String,
    session_id: Option<String>,
    server: InitializeResult,
    next_id: AtomicU64,
}

impl McpClient {
    /// Run the `initialize` handshake against `url`
    ///
    /// # Errors
    ///
    /// Returns error if the server is unreachable or rejects the handshake
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::new();

        let request = JsonRpcRequest::new(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
        );

        let response = client.post(&url).json(&request).send().await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let server: InitializeResult = decode_response(response).await?;

        tracing::info!(
            url = %url,
            server = %server.server_info.name,
            protocol = %server.protocol_version,
            "connected to MCP server"
        );

        let this = Self {
            client,
            url,
            session_id,
            server,
            next_id: AtomicU64::new(2),
        };
        this.notify("notifications/initialized").await?;
        Ok(this)
    }

    /// Result of the handshake
    #[must_use]
    pub const fn server(&self) -> &InitializeResult {
        &self.server
    }

    /// Session assigned by the server, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Tools advertised by the server
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a JSON-RPC error
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result: ListToolsResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    /// Invoke a tool
    ///
    /// A tool that fails on the server side still returns `Ok` with
    /// `is_error` set.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a JSON-RPC error
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        tracing::debug!(tool = name, "calling tool");
        self.request(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn request<T>(&self, method: &str, params: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let response = self.post(&request).send().await?;
        decode_response(response).await
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let response = self
            .post(&JsonRpcRequest::notification(method))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Mcp(format!(
                "notification {method} rejected with {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn post(&self, request: &JsonRpcRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(request);

        match &self.session_id {
            Some(session) => builder.header(SESSION_HEADER, session),
            None => builder,
        }
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Mcp(format!("MCP HTTP error {status}: {body}")));
    }

    let envelope: JsonRpcResponse = response.json().await?;

    if let Some(error) = envelope.error {
        return Err(Error::Mcp(format!(
            "JSON-RPC error {}: {}",
            error.code, error.message
        )));
    }

    let result = envelope
        .result
        .ok_or_else(|| Error::Mcp("response carries neither result nor error".to_string()))?;

    Ok(serde_json::from_value(result)?)
}
