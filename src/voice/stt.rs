//! Speech-to-text (STT) processing

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Default Hamsa realtime STT endpoint
pub const HAMSA_STT_URL: &str = "https://api.tryhamsa.com/v1/realtime/stt";

/// Turns recorded speech into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the audio or is unreachable
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HamsaSttRequest<'a> {
    audio_base64: String,
    language: &'a str,
    is_eos_enabled: bool,
    eos_threshold: f32,
}

/// Response body; the realtime endpoint nests the text under `data`
#[derive(Debug, Default, serde::Deserialize)]
struct HamsaSttResponse {
    #[serde(default)]
    data: Option<HamsaSttData>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct HamsaSttData {
    #[serde(default)]
    text: Option<String>,
}

impl HamsaSttResponse {
    fn into_text(self) -> String {
        self.data
            .and_then(|d| d.text)
            .or(self.text)
            .or(self.transcript)
            .unwrap_or_default()
    }
}

/// Hamsa STT client (Base64 WAV in a JSON body)
#[derive(Debug)]
pub struct HamsaStt {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    language: String,
    eos_threshold: f32,
}

impl HamsaStt {
    /// Create a client for the default endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, language: String) -> Result<Self> {
        Self::with_url(api_key, language, HAMSA_STT_URL.to_string())
    }

    /// Create a client for a custom endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn with_url(api_key: SecretString, language: String, url: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Hamsa STT API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            url,
            language,
            eos_threshold: 0.3,
        })
    }

    /// Configured recognition language
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Transcribe WAV bytes in a specific language
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API answers non-2xx
    pub async fn transcribe_in(&self, wav: &[u8], language: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), language, "starting Hamsa transcription");

        let request = HamsaSttRequest {
            audio_base64: BASE64.encode(wav),
            language,
            is_eos_enabled: false,
            eos_threshold: self.eos_threshold,
        };

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Hamsa STT request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Hamsa STT API error");
            return Err(Error::Stt(format!("Hamsa STT error {status}: {body}")));
        }

        let result: HamsaSttResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse STT response");
            e
        })?;

        let transcript = result.into_text();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for HamsaStt {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        self.transcribe_in(wav, &self.language).await
    }
}
