//! Tools exposed by the MCP server

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};

use super::protocol::{CallToolResult, ToolDefinition};
use crate::llm::Responder;
use crate::voice::stt::HamsaStt;
use crate::voice::tts::{HamsaTts, HamsaVoice};
use crate::voice::wav::normalize_wav_bytes;
use crate::{Error, Result};

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and input schema
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with already-parsed arguments
    ///
    /// # Errors
    ///
    /// Returns `Error::Mcp` for bad arguments, or the backend's error
    async fn call(&self, arguments: &Map<String, Value>) -> Result<CallToolResult>;
}

/// Tools keyed and listed by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any previous tool with the same name
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.definition().name;
        tracing::debug!(tool = %name, "registered tool");
        self.tools.insert(name, Arc::new(tool));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions in name order
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Mcp(format!("missing string argument '{key}'")))
}

fn optional_str<'a>(arguments: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn string_schema(properties: &[(&str, &str)], required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .iter()
        .map(|(name, description)| {
            (
                (*name).to_string(),
                json!({ "type": "string", "description": description }),
            )
        })
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Greets by name
pub struct HelloTool;

#[async_trait]
impl Tool for HelloTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "hello".to_string(),
            description: "Greet someone by name".to_string(),
            input_schema: string_schema(&[("name", "Who to greet")], &["name"]),
        }
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        let name = required_str(arguments, "name")?;
        Ok(CallToolResult::text(format!("Hello, {name}!")))
    }
}

/// Answers a prompt with the configured LLM
pub struct LlmTool {
    responder: Arc<dyn Responder>,
}

impl LlmTool {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self { responder }
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "llm_tool".to_string(),
            description: "Answer a free-form prompt with the language model".to_string(),
            input_schema: string_schema(&[("prompt", "Prompt to answer")], &["prompt"]),
        }
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        let prompt = required_str(arguments, "prompt")?;
        let answer = self.responder.complete(prompt).await?;
        Ok(CallToolResult::text(answer))
    }
}

/// Synthesizes speech with Hamsa, returning Base64 audio
pub struct TtsTool {
    tts: Arc<HamsaTts>,
}

impl TtsTool {
    pub fn new(tts: Arc<HamsaTts>) -> Self {
        Self { tts }
    }
}

#[async_trait]
impl Tool for TtsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tts_tool".to_string(),
            description: "Convert text to speech; returns Base64 audio".to_string(),
            input_schema: string_schema(
                &[
                    ("text", "Text to speak"),
                    ("speaker", "Voice name (default Noura)"),
                    ("dialect", "Dialect code (default pls)"),
                ],
                &["text"],
            ),
        }
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        let text = required_str(arguments, "text")?;
        let voice = HamsaVoice {
            speaker: optional_str(arguments, "speaker", "Noura").to_string(),
            dialect: optional_str(arguments, "dialect", "pls").to_string(),
        };

        let audio = self.tts.synthesize_with(text, &voice).await?;
        Ok(CallToolResult::structured(
            json!({ "audio_base64": BASE64.encode(audio) }),
        ))
    }
}

/// Transcribes a WAV file on the server's filesystem
///
/// The file is normalized to 16 kHz mono before upload.
pub struct SttTool {
    stt: Arc<HamsaStt>,
}

impl SttTool {
    pub fn new(stt: Arc<HamsaStt>) -> Self {
        Self { stt }
    }
}

#[async_trait]
impl Tool for SttTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "stt_tool".to_string(),
            description: "Transcribe a WAV file to text".to_string(),
            input_schema: string_schema(
                &[
                    ("audio_path", "Path to a WAV file"),
                    ("language", "Language code (default ar)"),
                ],
                &["audio_path"],
            ),
        }
    }

    async fn call(&self, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        let path = PathBuf::from(required_str(arguments, "audio_path")?);
        let language = optional_str(arguments, "language", "ar");

        let raw = tokio::fs::read(&path).await.map_err(|e| {
            Error::Mcp(format!("cannot read audio file {}: {e}", path.display()))
        })?;
        let wav = normalize_wav_bytes(&raw)?;
        let transcript = self.stt.transcribe_in(&wav, language).await?;

        Ok(CallToolResult::structured(json!({
            "transcript": transcript,
            "language": language,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hello_tool() {
        let mut args = Map::new();
        args.insert("name".to_string(), json!("Ada"));

        let result = HelloTool.call(&args).await.unwrap();
        assert_eq!(result.joined_text(), "Hello, Ada!");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let result = HelloTool.call(&Map::new()).await;
        assert!(matches!(result, Err(Error::Mcp(_))));
    }

    #[test]
    fn test_registry_orders_by_name() {
        struct Named(&'static str);

        #[async_trait]
        impl Tool for Named {
            fn definition(&self) -> ToolDefinition {
                ToolDefinition {
                    name: self.0.to_string(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                }
            }

            async fn call(&self, _: &Map<String, Value>) -> Result<CallToolResult> {
                Ok(CallToolResult::text(self.0))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Named("zeta"));
        registry.register(Named("alpha"));
        registry.register(HelloTool);

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha", "hello", "zeta"]);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_schema_lists_required() {
        let schema = HelloTool.definition().input_schema;
        assert_eq!(schema["required"][0], "name");
        assert_eq!(schema["properties"]["name"]["type"], "string");
    }
}
