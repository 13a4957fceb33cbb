//! Model Context Protocol scaffold
//!
//! A small MCP server exposing the voice backends as tools, a client for
//! it, and LLM-driven tool selection on top of the client.

mod client;
pub mod protocol;
mod selection;
mod server;
mod tools;

use std::sync::Arc;

pub use client::McpClient;
pub use protocol::{CallToolResult, Content, PROTOCOL_VERSION, SESSION_HEADER, ToolDefinition};
pub use selection::{
    PlanReport, SelectedTool, Selection, ToolInvoker, ToolOutcome, ToolPlanner, build_prompt,
    describe_tools, parse_selection,
};
pub use server::{McpState, router, serve};
pub use tools::{HelloTool, LlmTool, SttTool, Tool, ToolRegistry, TtsTool};

use crate::llm::Responder;
use crate::voice::{HamsaStt, HamsaTts};

/// Registry with `hello` plus whichever backend tools are configured
#[must_use]
pub fn builtin_tools(
    responder: Option<Arc<dyn Responder>>,
    stt: Option<Arc<HamsaStt>>,
    tts: Option<Arc<HamsaTts>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(HelloTool);

    match responder {
        Some(responder) => registry.register(LlmTool::new(responder)),
        None => tracing::warn!("no LLM key configured, llm_tool disabled"),
    }
    match tts {
        Some(tts) => registry.register(TtsTool::new(tts)),
        None => tracing::warn!("no TTS key configured, tts_tool disabled"),
    }
    match stt {
        Some(stt) => registry.register(SttTool::new(stt)),
        None => tracing::warn!("no STT key configured, stt_tool disabled"),
    }

    registry
}
