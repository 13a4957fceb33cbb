//! Language model clients
//!
//! Every backend implements [`Responder`]: given the caller's
//! [`ConversationHistory`], produce the assistant's next reply.

mod chat;
mod gemini;
mod history;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use secrecy::SecretString;

pub use chat::{CEREBRAS_BASE_URL, ChatCompletionsClient, OPENAI_BASE_URL};
pub use gemini::{GEMINI_BASE_URL, GeminiClient};
pub use history::{ChatMessage, ConversationHistory, Role};

use crate::{Error, Result};

/// Produces assistant replies
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate the next reply for a conversation
    ///
    /// The history is read, not modified; appending the reply is the
    /// caller's job.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or returns no text
    async fn respond(&self, history: &ConversationHistory) -> Result<String>;

    /// Answer a single prompt with no prior context
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or returns no text
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut history = ConversationHistory::new(None);
        history.push_user(prompt);
        self.respond(&history).await
    }
}

/// Hosted LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// `OpenAI` chat completions
    #[default]
    OpenAi,
    /// Cerebras (OpenAI-compatible)
    Cerebras,
    /// Google Gemini
    Gemini,
}

impl LlmProvider {
    /// Default model for the provider
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Cerebras => "gpt-oss-120b",
            Self::Gemini => "gemini-2.5-flash",
        }
    }

    /// Build a responder for this provider
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn build(
        self,
        api_key: SecretString,
        model: String,
        base_url: Option<String>,
    ) -> Result<Box<dyn Responder>> {
        Ok(match self {
            Self::OpenAi => Box::new(ChatCompletionsClient::new(
                api_key,
                base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                model,
            )?),
            Self::Cerebras => Box::new(
                ChatCompletionsClient::new(
                    api_key,
                    base_url.unwrap_or_else(|| CEREBRAS_BASE_URL.to_string()),
                    model,
                )?
                .with_temperature(0.2)
                .with_max_completion_tokens(1024),
            ),
            Self::Gemini => Box::new(GeminiClient::new(
                api_key,
                model,
                base_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            )?),
        })
    }
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "cerebras" => Ok(Self::Cerebras),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown LLM provider: {other}"))),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Cerebras => f.write_str("cerebras"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Box<T> {
    async fn respond(&self, history: &ConversationHistory) -> Result<String> {
        (**self).respond(history).await
    }
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for std::sync::Arc<T> {
    async fn respond(&self, history: &ConversationHistory) -> Result<String> {
        (**self).respond(history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("google".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert!("anthropic".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_default_models() {
        assert_eq!(LlmProvider::Cerebras.default_model(), "gpt-oss-120b");
        assert_eq!(LlmProvider::default().to_string(), "openai");
    }
}
