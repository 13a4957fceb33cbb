//! Configuration management
//!
//! Precedence is environment > TOML file > built-in defaults.

pub mod file;

use std::str::FromStr;
use std::sync::Arc;

use secrecy::SecretString;

use crate::llm::{LlmProvider, Responder};
use crate::pipeline::{DEFAULT_FAREWELLS, PipelineOptions};
use crate::voice::stt::HAMSA_STT_URL;
use crate::voice::tts::HAMSA_TTS_URL;
use crate::voice::{
    CaptureConfig, ClassifierKind, DEFAULT_ENERGY_THRESHOLD, HamsaStt, HamsaTts, HamsaVoice,
    LahajatiTts, LahajatiVoice,
};
use crate::{Error, Result};

use self::file::ConfigFile;

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI call assistant. Reply naturally in Arabic.";

/// Default MCP endpoint for the client
pub const DEFAULT_MCP_URL: &str = "http://localhost:8000/mcp";

/// Hard cap applied to live captures unless configured otherwise
pub const DEFAULT_HARD_CAP_MS: i64 = 30_000;

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub capture: CaptureSettings,
    pub stt: SttSettings,
    pub tts: TtsSettings,
    pub llm: LlmSettings,
    pub mcp: McpSettings,
    pub conversation: ConversationSettings,
}

/// Utterance capture configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub silence_ms: i64,
    pub hard_cap_ms: Option<i64>,
    pub vad_mode: u8,
    pub classifier: ClassifierKind,
    pub energy_threshold: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let core = CaptureConfig::default();
        Self {
            sample_rate: core.sample_rate,
            frame_ms: core.frame_duration_ms,
            silence_ms: core.silence_threshold_ms,
            hard_cap_ms: Some(DEFAULT_HARD_CAP_MS),
            vad_mode: core.sensitivity,
            classifier: ClassifierKind::default(),
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
        }
    }
}

impl CaptureSettings {
    /// Settings for the capture core
    #[must_use]
    pub const fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            frame_duration_ms: self.frame_ms,
            silence_threshold_ms: self.silence_ms,
            hard_cap_ms: self.hard_cap_ms,
            sensitivity: self.vad_mode,
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttSettings {
    pub api_key: Option<SecretString>,
    pub url: String,
    pub language: String,
}

impl SttSettings {
    /// Build the Hamsa STT client
    ///
    /// # Errors
    ///
    /// Returns error if `STT_API_KEY` is not set
    pub fn client(&self) -> Result<HamsaStt> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("STT_API_KEY not set".to_string()))?;
        HamsaStt::with_url(key, self.language.clone(), self.url.clone())
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub api_key: Option<SecretString>,
    pub url: String,
    pub voice: HamsaVoice,
    pub lahajati: LahajatiSettings,
}

impl TtsSettings {
    /// Build the Hamsa TTS client
    ///
    /// # Errors
    ///
    /// Returns error if `TTS_API_KEY` is not set
    pub fn client(&self) -> Result<HamsaTts> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("TTS_API_KEY not set".to_string()))?;
        HamsaTts::with_url(key, self.voice.clone(), self.url.clone())
    }
}

/// Lahajati TTS configuration
#[derive(Debug, Clone)]
pub struct LahajatiSettings {
    pub api_key: Option<SecretString>,
    pub url: Option<String>,
    pub voice_id: Option<String>,
    pub performance_id: String,
    pub dialect_id: String,
}

impl LahajatiSettings {
    /// Build the Lahajati client
    ///
    /// # Errors
    ///
    /// Returns error if the API key or voice id is not configured
    pub fn client(&self) -> Result<LahajatiTts> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("LAHAJATI_API_KEY not set".to_string()))?;
        let voice_id = self
            .voice_id
            .clone()
            .ok_or_else(|| Error::Config("Lahajati voice id not configured".to_string()))?;

        LahajatiTts::new(
            key,
            LahajatiVoice {
                voice_id,
                performance_id: self.performance_id.clone(),
                dialect_id: self.dialect_id.clone(),
            },
            self.url.clone(),
        )
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub system_prompt: String,
    pub openai_api_key: Option<SecretString>,
    pub cerebras_api_key: Option<SecretString>,
    pub google_api_key: Option<SecretString>,
}

impl LlmSettings {
    /// Key for the selected provider
    #[must_use]
    pub const fn api_key(&self) -> Option<&SecretString> {
        match self.provider {
            LlmProvider::OpenAi => self.openai_api_key.as_ref(),
            LlmProvider::Cerebras => self.cerebras_api_key.as_ref(),
            LlmProvider::Gemini => self.google_api_key.as_ref(),
        }
    }

    /// Build the responder for the selected provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is not set
    pub fn responder(&self) -> Result<Arc<dyn Responder>> {
        let key = self.api_key().cloned().ok_or_else(|| {
            Error::Config(format!("no API key configured for {}", self.provider))
        })?;
        let responder = self
            .provider
            .build(key, self.model.clone(), self.base_url.clone())?;
        Ok(Arc::from(responder))
    }
}

/// MCP configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSettings {
    pub url: String,
    pub host: String,
    pub port: u16,
}

impl McpSettings {
    /// Address the server binds to
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSettings {
    pub farewells: Vec<String>,
    pub reprompt: Option<String>,
    pub max_turns: Option<usize>,
}

impl ConversationSettings {
    /// Options for the voice pipeline
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            farewells: self.farewells.clone(),
            reprompt: self.reprompt.clone(),
            max_turns: self.max_turns,
        }
    }
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a value fails to parse
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or enum value fails to parse
    pub fn resolve<E>(fc: ConfigFile, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str, file: Option<String>| {
            env(key)
                .or(file)
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        };

        let defaults = CaptureSettings::default();
        let classifier = match fc.capture.classifier {
            Some(kind) => ClassifierKind::from_str(&kind).map_err(Error::Config)?,
            None => defaults.classifier,
        };
        let capture = CaptureSettings {
            sample_rate: parse_env(&env, "HAMSA_SAMPLE_RATE")?
                .or(fc.capture.sample_rate)
                .unwrap_or(defaults.sample_rate),
            frame_ms: parse_env(&env, "HAMSA_FRAME_MS")?
                .or(fc.capture.frame_ms)
                .unwrap_or(defaults.frame_ms),
            silence_ms: parse_env(&env, "HAMSA_SILENCE_MS")?
                .or(fc.capture.silence_ms)
                .unwrap_or(defaults.silence_ms),
            hard_cap_ms: parse_env(&env, "HAMSA_HARD_CAP_MS")?
                .or(fc.capture.hard_cap_ms)
                .or(defaults.hard_cap_ms),
            vad_mode: parse_env(&env, "HAMSA_VAD_MODE")?
                .or(fc.capture.vad_mode)
                .unwrap_or(defaults.vad_mode),
            classifier,
            energy_threshold: fc
                .capture
                .energy_threshold
                .unwrap_or(defaults.energy_threshold),
        };

        let stt = SttSettings {
            api_key: secret("STT_API_KEY", fc.stt.api_key),
            url: env("HAMSA_STT_URL")
                .or(fc.stt.url)
                .unwrap_or_else(|| HAMSA_STT_URL.to_string()),
            language: fc.stt.language.unwrap_or_else(|| "ar".to_string()),
        };

        let default_voice = HamsaVoice::default();
        let lahajati = fc.tts.lahajati;
        let tts = TtsSettings {
            api_key: secret("TTS_API_KEY", fc.tts.api_key),
            url: env("HAMSA_TTS_URL")
                .or(fc.tts.url)
                .unwrap_or_else(|| HAMSA_TTS_URL.to_string()),
            voice: HamsaVoice {
                speaker: fc.tts.speaker.unwrap_or(default_voice.speaker),
                dialect: fc.tts.dialect.unwrap_or(default_voice.dialect),
            },
            lahajati: LahajatiSettings {
                api_key: secret("LAHAJATI_API_KEY", lahajati.api_key),
                url: lahajati.url,
                voice_id: env("LAHAJATI_VOICE_ID").or(lahajati.voice_id),
                performance_id: lahajati.performance_id.unwrap_or_else(|| "3".to_string()),
                dialect_id: lahajati.dialect_id.unwrap_or_else(|| "10".to_string()),
            },
        };

        let provider = match env("HAMSA_LLM_PROVIDER").or(fc.llm.provider) {
            Some(name) => LlmProvider::from_str(&name)?,
            None => LlmProvider::default(),
        };
        let llm = LlmSettings {
            provider,
            model: env("HAMSA_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| provider.default_model().to_string()),
            base_url: fc.llm.base_url,
            system_prompt: fc
                .llm
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            openai_api_key: secret("OPENAI_API_KEY", fc.llm.openai_api_key),
            cerebras_api_key: secret("CEREBRAS_API_KEY", fc.llm.cerebras_api_key),
            google_api_key: secret("GOOGLE_API_KEY", fc.llm.google_api_key),
        };

        let mcp = McpSettings {
            url: env("HAMSA_MCP_URL")
                .or(fc.mcp.url)
                .unwrap_or_else(|| DEFAULT_MCP_URL.to_string()),
            host: fc.mcp.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: fc.mcp.port.unwrap_or(8000),
        };

        let conversation = ConversationSettings {
            farewells: fc.conversation.farewells.unwrap_or_else(|| {
                DEFAULT_FAREWELLS.iter().map(ToString::to_string).collect()
            }),
            reprompt: fc.conversation.reprompt,
            max_turns: fc.conversation.max_turns,
        };

        Ok(Self {
            capture,
            stt,
            tts,
            llm,
            mcp,
            conversation,
        })
    }
}

fn parse_env<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve(file: &str, env: &[(&str, &str)]) -> Result<Config> {
        let fc: ConfigFile = toml::from_str(file).unwrap();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(fc, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve("", &[]).unwrap();

        assert_eq!(config.capture.sample_rate, 16_000);
        assert_eq!(config.capture.frame_ms, 10);
        assert_eq!(config.capture.silence_ms, 500);
        assert_eq!(config.capture.hard_cap_ms, Some(DEFAULT_HARD_CAP_MS));
        assert_eq!(config.capture.vad_mode, 2);
        assert_eq!(config.stt.language, "ar");
        assert_eq!(config.tts.voice.speaker, "Majd");
        assert_eq!(config.tts.voice.dialect, "egy");
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.mcp.url, DEFAULT_MCP_URL);
        assert_eq!(config.conversation.farewells.len(), 3);
        assert!(config.stt.api_key.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = resolve(
            "[capture]\nsilence_ms = 800\nframe_ms = 20\n[llm]\nprovider = \"gemini\"",
            &[("HAMSA_SILENCE_MS", "300"), ("STT_API_KEY", "k-1")],
        )
        .unwrap();

        assert_eq!(config.capture.silence_ms, 300);
        assert_eq!(config.capture.frame_ms, 20);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(
            config.stt.api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("k-1")
        );
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = resolve("", &[("HAMSA_FRAME_MS", "ten")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_key_treated_as_missing() {
        let config = resolve("", &[("OPENAI_API_KEY", "")]).unwrap();
        assert!(config.llm.api_key().is_none());
        assert!(config.llm.responder().is_err());
    }

    #[test]
    fn test_to_capture_config() {
        let settings = CaptureSettings {
            hard_cap_ms: None,
            ..CaptureSettings::default()
        };
        let core = settings.to_capture_config();

        assert_eq!(core, CaptureConfig::default());
        assert_eq!(core.frame_len(), 160);
    }

    #[test]
    fn test_missing_stt_key_is_config_error() {
        let config = resolve("", &[]).unwrap();
        assert!(matches!(config.stt.client(), Err(Error::Config(_))));
    }
}
