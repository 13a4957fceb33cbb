//! OpenAI-compatible chat completions

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ConversationHistory, Responder};
use crate::{Error, Result};

/// `OpenAI` API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Cerebras API base URL
pub const CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any `/chat/completions` endpoint
#[derive(Debug)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_completion_tokens: Option<u32>,
}

impl ChatCompletionsClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("chat completions API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: None,
            max_completion_tokens: None,
        })
    }

    /// Set sampling temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap reply length
    #[must_use]
    pub const fn with_max_completion_tokens(mut self, tokens: u32) -> Self {
        self.max_completion_tokens = Some(tokens);
        self
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Responder for ChatCompletionsClient {
    async fn respond(&self, history: &ConversationHistory) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: history.messages(),
            temperature: self.temperature,
            max_completion_tokens: self.max_completion_tokens,
            stream: false,
        };

        tracing::debug!(model = %self.model, messages = history.len(), "requesting chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion error");
            return Err(Error::Llm(format!("chat completion error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Llm("chat completion returned no content".to_string()))?;

        tracing::debug!(chars = reply.chars().count(), "chat completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_options() {
        let history = ConversationHistory::new(Some("sys"));
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: history.messages(),
            temperature: None,
            max_completion_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = ChatCompletionsClient::new(
            SecretString::from("key".to_string()),
            "http://localhost:9000/v1/".to_string(),
            "m".to_string(),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:9000/v1");
    }
}
