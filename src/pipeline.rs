//! Listen → transcribe → respond → speak conversation loop
//!
//! The loop is parameterized over four collaborators so the same pipeline
//! drives the live microphone demo and scripted tests.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::{ConversationHistory, Responder};
use crate::voice::{
    AudioPlayback, CaptureConfig, CaptureError, MicrophoneSource, Synthesizer, Transcriber,
    Utterance, UtteranceCapturer, VoiceActivityClassifier, record_for,
};
use crate::{Error, Result};

/// Farewells that end a conversation after the reply is spoken
pub const DEFAULT_FAREWELLS: [&str; 3] = ["bye", "باي", "مع السلامة"];

/// Produces one utterance per turn
#[async_trait(?Send)]
pub trait Listener {
    /// Wait for the user's next utterance
    ///
    /// # Errors
    ///
    /// See [`CaptureError`]
    async fn listen(&mut self, cancel: &CancellationToken) -> Result<Utterance, CaptureError>;
}

/// Speaks a reply aloud
#[async_trait(?Send)]
pub trait Speaker {
    /// Speak text, returning once playback is done
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// How a conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEnd {
    /// The user said goodbye
    Farewell,
    /// The caller cancelled
    Cancelled,
    /// The configured turn limit was reached
    TurnLimit,
}

/// Pipeline behavior knobs
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Phrases (lowercase) that end the conversation
    pub farewells: Vec<String>,
    /// Spoken when an utterance had no speech
    pub reprompt: Option<String>,
    /// Stop after this many completed turns
    pub max_turns: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            farewells: DEFAULT_FAREWELLS.iter().map(ToString::to_string).collect(),
            reprompt: None,
            max_turns: None,
        }
    }
}

impl PipelineOptions {
    /// Whether the user text contains a farewell
    #[must_use]
    pub fn is_farewell(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        self.farewells
            .iter()
            .any(|f| !f.is_empty() && normalized.contains(&f.to_lowercase()))
    }
}

/// One conversation loop over pluggable collaborators
pub struct VoicePipeline<L, T, R, S> {
    listener: L,
    transcriber: T,
    responder: R,
    speaker: S,
    options: PipelineOptions,
}

impl<L, T, R, S> VoicePipeline<L, T, R, S>
where
    L: Listener,
    T: Transcriber,
    R: Responder,
    S: Speaker,
{
    /// Assemble a pipeline
    pub const fn new(
        listener: L,
        transcriber: T,
        responder: R,
        speaker: S,
        options: PipelineOptions,
    ) -> Self {
        Self {
            listener,
            transcriber,
            responder,
            speaker,
            options,
        }
    }

    /// Run turns until farewell, cancellation, or the turn limit
    ///
    /// `history` is owned by the caller and grows by one user and one
    /// assistant message per completed turn.
    ///
    /// # Errors
    ///
    /// Returns error on device failure, invalid capture config, or a
    /// responder failure
    pub async fn run(
        &mut self,
        history: &mut ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<ConversationEnd> {
        let mut turns = 0usize;

        loop {
            if let Some(max) = self.options.max_turns
                && turns >= max
            {
                tracing::info!(turns, "turn limit reached");
                return Ok(ConversationEnd::TurnLimit);
            }

            tracing::info!("listening");
            let utterance = match self.listener.listen(cancel).await {
                Ok(utterance) => utterance,
                Err(CaptureError::NoSpeechDetected) => {
                    tracing::info!("no speech detected");
                    if let Some(reprompt) = self.options.reprompt.clone() {
                        self.say(&reprompt).await;
                    }
                    continue;
                }
                Err(CaptureError::Cancelled) => {
                    tracing::info!("conversation cancelled");
                    return Ok(ConversationEnd::Cancelled);
                }
                Err(e) => return Err(e.into()),
            };

            tracing::debug!(
                duration_ms = utterance.duration_ms(),
                frames = utterance.frame_count(),
                "utterance captured"
            );

            let wav = utterance.to_wav()?;
            let user_text = match self.transcriber.transcribe(&wav).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    tracing::info!("empty transcript");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed");
                    continue;
                }
            };

            tracing::info!(user = %user_text, "user said");
            history.push_user(user_text.clone());

            let reply = match self.responder.respond(history).await {
                Ok(reply) => reply,
                Err(e) => {
                    history.pop_last();
                    return Err(e);
                }
            };

            tracing::info!(reply = %reply, "agent response");
            history.push_assistant(reply.clone());
            turns += 1;

            self.say(&reply).await;

            if self.options.is_farewell(&user_text) {
                tracing::info!("conversation ended by farewell");
                return Ok(ConversationEnd::Farewell);
            }
        }
    }

    async fn say(&mut self, text: &str) {
        if let Err(e) = self.speaker.speak(text).await {
            tracing::warn!(error = %e, "failed to speak reply");
        }
    }

    /// Take the collaborators back
    pub fn into_parts(self) -> (L, T, R, S) {
        (self.listener, self.transcriber, self.responder, self.speaker)
    }
}

/// Listens on the default microphone, one device session per turn
pub struct MicrophoneListener<C> {
    capturer: UtteranceCapturer<C>,
    fixed_duration_ms: Option<u64>,
}

impl<C: VoiceActivityClassifier> MicrophoneListener<C> {
    /// Voice-activity-gated listener
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` before any device is opened
    pub fn new(config: CaptureConfig, classifier: C) -> Result<Self, CaptureError> {
        Ok(Self {
            capturer: UtteranceCapturer::new(config, classifier)?,
            fixed_duration_ms: None,
        })
    }

    /// Record a fixed span per turn instead of waiting for silence
    #[must_use]
    pub const fn with_fixed_duration(mut self, duration_ms: u64) -> Self {
        self.fixed_duration_ms = Some(duration_ms);
        self
    }
}

#[async_trait(?Send)]
impl<C: VoiceActivityClassifier> Listener for MicrophoneListener<C> {
    async fn listen(&mut self, cancel: &CancellationToken) -> Result<Utterance, CaptureError> {
        let config = self.capturer.config();
        let mut source = MicrophoneSource::open(config)?;

        match self.fixed_duration_ms {
            Some(duration_ms) => record_for(config, &mut source, duration_ms, cancel).await,
            None => self.capturer.capture_until(&mut source, cancel).await,
        }
    }
}

/// Synthesizes replies and plays them on the default output device
pub struct PlaybackSpeaker<Y> {
    synthesizer: Y,
    playback: AudioPlayback,
}

impl<Y: Synthesizer> PlaybackSpeaker<Y> {
    /// Pair a synthesizer with an output device
    pub const fn new(synthesizer: Y, playback: AudioPlayback) -> Self {
        Self {
            synthesizer,
            playback,
        }
    }
}

#[async_trait(?Send)]
impl<Y: Synthesizer> Speaker for PlaybackSpeaker<Y> {
    async fn speak(&mut self, text: &str) -> Result<()> {
        let audio = self.synthesizer.synthesize(text).await?;
        if audio.is_empty() {
            return Err(Error::Tts("empty audio response".to_string()));
        }
        self.playback.play_bytes(&audio)?;
        tracing::debug!("reply played");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_farewell_detection() {
        let options = PipelineOptions::default();

        assert!(options.is_farewell("OK, Bye!"));
        assert!(options.is_farewell("شكرا مع السلامة"));
        assert!(options.is_farewell("باي"));
        assert!(!options.is_farewell("what time is it"));
    }

    #[test]
    fn test_empty_farewell_never_matches() {
        let options = PipelineOptions {
            farewells: vec![String::new()],
            ..PipelineOptions::default()
        };
        assert!(!options.is_farewell("anything"));
    }
}
