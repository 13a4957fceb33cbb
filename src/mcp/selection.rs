//! LLM-driven tool selection
//!
//! The model is shown every tool with its input schema and asked to answer
//! with a JSON plan. Each selected tool is then called in order.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::client::McpClient;
use super::protocol::{CallToolResult, ToolDefinition};
use super::tools::ToolRegistry;
use crate::llm::Responder;
use crate::{Error, Result};

const SELECTION_PROMPT: &str = r#"You are an AI assistant integrated into a Model Context Protocol (MCP) system.
You have access to the following tools:

{tools_list}

Each tool has a name, description, and parameters (input schema). Your task is to:
1. Read the user's input describing what they want to achieve.
2. Determine the best tool(s) from the list that can be used to accomplish their task.
3. For each selected tool, extract or infer the required arguments from the user's request based on the tool's parameters.
4. If multiple tools are required in sequence, list them in order and describe how they will work together.
5. If no tools match the user's description, reply with an empty selected_tools array.

IMPORTANT: For each tool, you MUST provide the correct arguments based on the tool's parameters schema.
Extract argument values from the user's request. If a required argument is not provided in the user request,
use reasonable defaults or infer from context.

Respond in JSON format as follows:

{
"selected_tools": [
    {
        "tool_name": "tool_name_1",
        "arguments": {"arg1": "value1", "arg2": "value2"}
    },
    {
        "tool_name": "tool_name_2",
        "arguments": {"arg1": "value1"}
    }
],
"explanation": "Brief explanation why these tools are selected and how they can solve the user's task."
}

Here is the user request:
"{user_request}"
"#;

/// Render tools as `- name: description` plus their schema
#[must_use]
pub fn describe_tools(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "No tools available".to_string();
    }

    tools
        .iter()
        .map(|tool| {
            format!(
                "- {}: {}\n  Parameters: {}",
                tool.name, tool.description, tool.input_schema
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill the selection template
#[must_use]
pub fn build_prompt(tools: &[ToolDefinition], user_request: &str) -> String {
    SELECTION_PROMPT
        .replace("{tools_list}", &describe_tools(tools))
        .replace("{user_request}", user_request)
}

/// One tool the model asked for
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTool {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// The model's plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub tools: Vec<SelectedTool>,
    pub explanation: String,
}

/// Parse the model's answer
///
/// Only the span from the first `{` to the last `}` is read, so prose
/// around the JSON is tolerated. Entries may be bare tool names or objects
/// with `tool_name` (or `name`) and `arguments`; anything else is skipped.
///
/// # Errors
///
/// Returns `Error::Llm` when no JSON object can be found or parsed
pub fn parse_selection(answer: &str) -> Result<Selection> {
    let start = answer.find('{');
    let end = answer.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &answer[start..=end],
        _ => {
            return Err(Error::Llm(
                "no JSON object in tool selection answer".to_string(),
            ));
        }
    };

    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::Llm(format!("invalid tool selection JSON: {e}")))?;

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let entries = value
        .get("selected_tools")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let tools = entries
        .iter()
        .filter_map(|entry| {
            let selected = selected_tool(entry);
            if selected.is_none() {
                tracing::warn!(entry = %entry, "invalid tool format");
            }
            selected
        })
        .collect();

    Ok(Selection { tools, explanation })
}

fn selected_tool(entry: &Value) -> Option<SelectedTool> {
    match entry {
        Value::String(name) => Some(SelectedTool {
            name: name.clone(),
            arguments: Map::new(),
        }),
        Value::Object(object) => {
            let name = object
                .get("tool_name")
                .or_else(|| object.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = object
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Some(SelectedTool { name, arguments })
        }
        _ => None,
    }
}

/// Something that can run a named tool
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Call a tool
    ///
    /// # Errors
    ///
    /// Returns error when the call cannot be made at all
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult>;
}

#[async_trait]
impl ToolInvoker for McpClient {
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        self.call_tool(name, arguments).await
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Mcp(format!("unknown tool: {name}")))?;
        tool.call(&arguments).await
    }
}

/// Result of calling one selected tool
#[derive(Debug)]
pub struct ToolOutcome {
    pub tool: String,
    pub arguments: Map<String, Value>,
    pub result: Result<CallToolResult>,
}

impl ToolOutcome {
    /// Whether the call went through and the tool reported success
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(result) if !result.is_error)
    }
}

/// What a planner run did
#[derive(Debug, Default)]
pub struct PlanReport {
    pub explanation: String,
    pub outcomes: Vec<ToolOutcome>,
    /// Tools the model named that the server does not offer
    pub skipped: Vec<String>,
    /// The model was unreachable and the first tool was tried instead
    pub fell_back: bool,
}

/// Asks a model which tools to run and runs them
pub struct ToolPlanner<R> {
    responder: R,
}

impl<R: Responder> ToolPlanner<R> {
    pub const fn new(responder: R) -> Self {
        Self { responder }
    }

    /// Plan and execute a user request against `tools`
    ///
    /// # Errors
    ///
    /// Returns `Error::Llm` when the model answers without a parseable plan
    pub async fn run<I>(
        &self,
        tools: &[ToolDefinition],
        user_request: &str,
        invoker: &I,
    ) -> Result<PlanReport>
    where
        I: ToolInvoker + ?Sized,
    {
        let prompt = build_prompt(tools, user_request);
        tracing::info!("using LLM to select tools");

        let answer = match self.responder.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "LLM error");
                return Ok(Self::fall_back(tools, invoker).await);
            }
        };
        tracing::debug!(answer = %answer, "LLM response");

        let selection = parse_selection(&answer)?;
        tracing::info!(
            selected = selection.tools.len(),
            explanation = %selection.explanation,
            "tools selected"
        );

        let mut report = PlanReport {
            explanation: selection.explanation,
            ..PlanReport::default()
        };

        for selected in selection.tools {
            if !tools.iter().any(|t| t.name == selected.name) {
                tracing::warn!(tool = %selected.name, "tool not found");
                report.skipped.push(selected.name);
                continue;
            }

            tracing::info!(tool = %selected.name, "calling tool");
            let result = invoker
                .invoke(&selected.name, selected.arguments.clone())
                .await;
            if let Err(e) = &result {
                tracing::error!(tool = %selected.name, error = %e, "tool call failed");
            }

            report.outcomes.push(ToolOutcome {
                tool: selected.name,
                arguments: selected.arguments,
                result,
            });
        }

        Ok(report)
    }

    async fn fall_back<I>(tools: &[ToolDefinition], invoker: &I) -> PlanReport
    where
        I: ToolInvoker + ?Sized,
    {
        let mut report = PlanReport {
            fell_back: true,
            ..PlanReport::default()
        };

        let Some(first) = tools.first() else {
            tracing::warn!("no tools available for fallback");
            return report;
        };

        tracing::info!(tool = %first.name, "falling back to first available tool");
        let result = invoker.invoke(&first.name, Map::new()).await;
        report.outcomes.push(ToolOutcome {
            tool: first.name.clone(),
            arguments: Map::new(),
            result,
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_describe_tools() {
        let text = describe_tools(&[tool("hello"), tool("tts_tool")]);

        assert!(text.starts_with("- hello: hello tool\n  Parameters: {"));
        assert!(text.contains("- tts_tool: tts_tool tool"));
        assert_eq!(describe_tools(&[]), "No tools available");
    }

    #[test]
    fn test_build_prompt_fills_placeholders() {
        let prompt = build_prompt(&[tool("hello")], "greet Sara");

        assert!(prompt.contains("- hello: hello tool"));
        assert!(prompt.contains("\"greet Sara\""));
        assert!(!prompt.contains("{tools_list}"));
        assert!(!prompt.contains("{user_request}"));
    }

    #[test]
    fn test_parse_selection_with_surrounding_prose() {
        let answer = r#"Sure! {"selected_tools":[{"tool_name":"hello","arguments":{"name":"Sara"}},"llm_tool",{"name":"tts_tool"},42],"explanation":"greeting"} done"#;
        let selection = parse_selection(answer).unwrap();

        assert_eq!(selection.explanation, "greeting");
        assert_eq!(selection.tools.len(), 3);
        assert_eq!(selection.tools[0].name, "hello");
        assert_eq!(selection.tools[0].arguments["name"], "Sara");
        assert_eq!(selection.tools[1].name, "llm_tool");
        assert!(selection.tools[1].arguments.is_empty());
        assert_eq!(selection.tools[2].name, "tts_tool");
    }

    #[test]
    fn test_parse_selection_without_json() {
        assert!(matches!(parse_selection("no idea"), Err(Error::Llm(_))));
        assert!(matches!(parse_selection("} {"), Err(Error::Llm(_))));
    }

    #[test]
    fn test_parse_selection_empty_plan() {
        let selection = parse_selection(r#"{"selected_tools":[]}"#).unwrap();
        assert!(selection.tools.is_empty());
        assert!(selection.explanation.is_empty());
    }
}
