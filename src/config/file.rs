//! TOML configuration file loading
//!
//! Supports `~/.config/hamsa-voice/config.toml` as a persistent config source,
//! overridable with `HAMSA_CONFIG`. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub capture: CaptureFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub mcp: McpFileConfig,

    #[serde(default)]
    pub conversation: ConversationFileConfig,
}

/// Utterance capture settings
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub sample_rate: Option<u32>,
    pub frame_ms: Option<u32>,
    pub silence_ms: Option<i64>,
    pub hard_cap_ms: Option<i64>,
    /// WebRTC VAD aggressiveness (0..=3)
    pub vad_mode: Option<u8>,
    /// "webrtc" or "energy"
    pub classifier: Option<String>,
    /// RMS threshold for the energy classifier
    pub energy_threshold: Option<f32>,
}

/// Speech-to-text settings
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub language: Option<String>,
}

/// Text-to-speech settings
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub speaker: Option<String>,
    pub dialect: Option<String>,

    #[serde(default)]
    pub lahajati: LahajatiFileConfig,
}

/// Lahajati voice settings
#[derive(Debug, Default, Deserialize)]
pub struct LahajatiFileConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub voice_id: Option<String>,
    pub performance_id: Option<String>,
    pub dialect_id: Option<String>,
}

/// Language model settings
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "openai", "cerebras" or "gemini"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub openai_api_key: Option<String>,
    pub cerebras_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

/// MCP server and client settings
#[derive(Debug, Default, Deserialize)]
pub struct McpFileConfig {
    /// Endpoint the client connects to
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Conversation loop settings
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    pub farewells: Option<Vec<String>>,
    pub reprompt: Option<String>,
    pub max_turns: Option<usize>,
}

/// Load the TOML config file from `HAMSA_CONFIG` or the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let path = std::env::var("HAMSA_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    path.map_or_else(ConfigFile::default, |path| load_config_from(&path))
}

/// Load a specific config file, falling back to defaults
pub fn load_config_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/hamsa-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hamsa-voice").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [capture]
            silence_ms = 800

            [tts]
            speaker = "Noura"

            [tts.lahajati]
            voice_id = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(file.capture.silence_ms, Some(800));
        assert_eq!(file.capture.sample_rate, None);
        assert_eq!(file.tts.speaker.as_deref(), Some("Noura"));
        assert_eq!(file.tts.lahajati.voice_id.as_deref(), Some("abc"));
        assert!(file.llm.provider.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_config_from(&dir.path().join("absent.toml"));
        assert!(file.capture.frame_ms.is_none());
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[capture\nsilence_ms = ").unwrap();

        let file = load_config_from(&path);
        assert!(file.capture.silence_ms.is_none());
    }

    #[test]
    fn test_config_path_suffix() {
        if let Some(path) = config_file_path() {
            assert!(path.ends_with("hamsa-voice/config.toml"));
        }
    }
}
