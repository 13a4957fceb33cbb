//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Default Hamsa realtime TTS endpoint
pub const HAMSA_TTS_URL: &str = "https://api.tryhamsa.com/v1/realtime/tts";

/// Default Lahajati absolute-control endpoint
pub const LAHAJATI_TTS_URL: &str = "https://lahajati.ai/api/v1/text-to-speech-absolute-control";

/// Turns text into encoded audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text, returning container bytes (WAV, MP3 or raw PCM)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Hamsa speaker/dialect pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HamsaVoice {
    /// Voice name (e.g. "Majd", "Noura")
    pub speaker: String,
    /// Dialect code (e.g. "egy", "pls")
    pub dialect: String,
}

impl Default for HamsaVoice {
    fn default() -> Self {
        Self {
            speaker: "Majd".to_string(),
            dialect: "egy".to_string(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct HamsaTtsJson {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    data: Option<HamsaTtsData>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct HamsaTtsData {
    #[serde(default)]
    audio_base64: Option<String>,
}

/// Hamsa realtime TTS client
#[derive(Debug)]
pub struct HamsaTts {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    voice: HamsaVoice,
    mulaw: bool,
}

impl HamsaTts {
    /// Create a client for the default endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, voice: HamsaVoice) -> Result<Self> {
        Self::with_url(api_key, voice, HAMSA_TTS_URL.to_string())
    }

    /// Create a client for a custom endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn with_url(api_key: SecretString, voice: HamsaVoice, url: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Hamsa TTS API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            url,
            voice,
            mulaw: false,
        })
    }

    /// Configured default voice
    #[must_use]
    pub const fn voice(&self) -> &HamsaVoice {
        &self.voice
    }

    /// Synthesize with an explicit voice
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the API answers non-2xx, or a
    /// JSON body carries invalid Base64
    pub async fn synthesize_with(&self, text: &str, voice: &HamsaVoice) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            speaker: &'a str,
            dialect: &'a str,
            mulaw: bool,
        }

        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let request = TtsRequest {
            text,
            speaker: &voice.speaker,
            dialect: &voice.dialect,
            mulaw: self.mulaw,
        };

        tracing::debug!(chars = text.chars().count(), speaker = %voice.speaker, "starting Hamsa synthesis");

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Hamsa TTS error {status}: {body}")));
        }

        let body = response.bytes().await?;
        let audio = decode_tts_body(&body)?;

        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio)
    }
}

#[async_trait]
impl Synthesizer for HamsaTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.synthesize_with(text, &self.voice).await
    }
}

/// Extract audio from a TTS body
///
/// JSON bodies carry Base64 audio; anything that is not JSON is treated as
/// the audio itself.
fn decode_tts_body(body: &[u8]) -> Result<Vec<u8>> {
    let Ok(json) = serde_json::from_slice::<HamsaTtsJson>(body) else {
        return Ok(body.to_vec());
    };

    let encoded = json
        .audio_base64
        .or_else(|| json.data.and_then(|d| d.audio_base64))
        .ok_or_else(|| {
            let preview: String = String::from_utf8_lossy(body).chars().take(200).collect();
            Error::Tts(format!("unexpected TTS response: {preview}"))
        })?;

    BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::Tts(format!("invalid audio Base64: {e}")))
}

/// Lahajati voice selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LahajatiVoice {
    /// Voice identifier
    pub voice_id: String,
    /// Performance style identifier
    pub performance_id: String,
    /// Dialect identifier
    pub dialect_id: String,
}

/// Lahajati TTS client (returns MP3)
#[derive(Debug)]
pub struct LahajatiTts {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    voice: LahajatiVoice,
}

impl LahajatiTts {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, voice: LahajatiVoice, url: Option<String>) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Lahajati API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            url: url.unwrap_or_else(|| LAHAJATI_TTS_URL.to_string()),
            voice,
        })
    }
}

#[async_trait]
impl Synthesizer for LahajatiTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct LahajatiRequest<'a> {
            text: &'a str,
            id_voice: &'a str,
            input_mode: &'a str,
            performance_id: &'a str,
            dialect_id: &'a str,
        }

        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let request = LahajatiRequest {
            text,
            id_voice: &self.voice.voice_id,
            input_mode: "0",
            performance_id: &self.voice.performance_id,
            dialect_id: &self.voice.dialect_id,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Lahajati TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "Lahajati synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_body() {
        let body = br#"{"audioBase64":"UklGRg=="}"#;
        assert_eq!(decode_tts_body(body).unwrap(), b"RIFF");

        let nested = br#"{"data":{"audioBase64":"UklGRg=="}}"#;
        assert_eq!(decode_tts_body(nested).unwrap(), b"RIFF");
    }

    #[test]
    fn test_decode_raw_body() {
        let raw = [0xFF_u8, 0xFB, 0x90, 0x00];
        assert_eq!(decode_tts_body(&raw).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_decode_json_without_audio() {
        let body = br#"{"message":"quota exceeded"}"#;
        assert!(matches!(decode_tts_body(body), Err(Error::Tts(_))));
    }
}
