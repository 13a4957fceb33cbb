//! Voice-activity-gated utterance capture
//!
//! Pulls fixed-size frames from an [`AudioFrameSource`], classifies each one
//! with a [`VoiceActivityClassifier`], and finishes once trailing silence
//! reaches the configured threshold after speech, or the hard cap elapses.
//!
//! ```text
//! Idle ──► Recording ──► Finalizing ──► Done
//!              │
//!              └──────► Aborted (device failure, invalid config, cancel)
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::classifier::VoiceActivityClassifier;
use super::frame::{AudioFrame, Utterance};

/// Capture outcomes other than a finished utterance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Configuration rejected before any device was touched
    #[error("invalid capture config: {0}")]
    InvalidConfig(String),

    /// Input stream could not be opened or broke mid-capture
    #[error("audio device failure: {0}")]
    DeviceFailure(String),

    /// Hard cap reached without a single speech frame
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Capture was cancelled by the caller
    #[error("capture cancelled")]
    Cancelled,
}

/// Settings resolved before a capture starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Duration of each frame in milliseconds
    pub frame_duration_ms: u32,

    /// Consecutive non-speech needed to end an utterance
    pub silence_threshold_ms: i64,

    /// Upper bound on total capture time
    pub hard_cap_ms: Option<i64>,

    /// Voice-activity sensitivity (0 = lenient, 3 = strict)
    pub sensitivity: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 10,
            silence_threshold_ms: 500,
            hard_cap_ms: None,
            sensitivity: 2,
        }
    }
}

impl CaptureConfig {
    /// Samples per frame
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Check the config against the classifier that will judge its frames
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unsupported frame sizes, negative
    /// thresholds, or an out-of-range sensitivity
    pub fn validate<C>(&self, classifier: &C) -> Result<(), CaptureError>
    where
        C: VoiceActivityClassifier + ?Sized,
    {
        if !classifier.supports(self.sample_rate, self.frame_duration_ms) {
            return Err(CaptureError::InvalidConfig(format!(
                "{} classifier does not accept {} ms frames at {} Hz",
                classifier.name(),
                self.frame_duration_ms,
                self.sample_rate
            )));
        }

        if self.frame_len() == 0 {
            return Err(CaptureError::InvalidConfig(
                "frame holds no samples".to_string(),
            ));
        }

        if self.silence_threshold_ms < 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "silence threshold must be non-negative, got {} ms",
                self.silence_threshold_ms
            )));
        }

        if let Some(cap) = self.hard_cap_ms
            && cap < 0
        {
            return Err(CaptureError::InvalidConfig(format!(
                "hard cap must be non-negative, got {cap} ms"
            )));
        }

        if self.sensitivity > 3 {
            return Err(CaptureError::InvalidConfig(format!(
                "sensitivity must be 0..=3, got {}",
                self.sensitivity
            )));
        }

        Ok(())
    }
}

/// Produces frames for a capture
///
/// Frames must be mono i16 at the configured rate and exact frame length.
/// `next_frame` is the only suspension point of a capture.
#[async_trait(?Send)]
pub trait AudioFrameSource {
    /// Wait for the next frame
    ///
    /// # Errors
    ///
    /// Returns `DeviceFailure` when the underlying stream breaks or ends
    async fn next_frame(&mut self) -> Result<AudioFrame, CaptureError>;
}

#[async_trait(?Send)]
impl<S: AudioFrameSource + ?Sized> AudioFrameSource for Box<S> {
    async fn next_frame(&mut self) -> Result<AudioFrame, CaptureError> {
        (**self).next_frame().await
    }
}

/// Verdict after a frame is pushed into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// Keep recording
    Continue,
    /// Stop condition reached with speech present
    Complete,
    /// Hard cap reached without any speech
    NoSpeech,
}

/// Mutable accumulator for one capture
///
/// Usable directly from a callback-driven audio loop: push each classified
/// frame and stop when the returned step is no longer `Continue`.
#[derive(Debug)]
pub struct CaptureSession {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
    frame_len: usize,
    frame_ms: u64,
    silence_threshold_ms: u64,
    hard_cap_ms: Option<u64>,
    silence_ms: u64,
    elapsed_ms: u64,
    speech_frames: usize,
}

impl CaptureSession {
    /// Start an empty session for an already validated config
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            frames: Vec::new(),
            sample_rate: config.sample_rate,
            frame_len: config.frame_len(),
            frame_ms: u64::from(config.frame_duration_ms),
            silence_threshold_ms: config.silence_threshold_ms.max(0).unsigned_abs(),
            hard_cap_ms: config.hard_cap_ms.map(|cap| cap.max(0).unsigned_abs()),
            silence_ms: 0,
            elapsed_ms: 0,
            speech_frames: 0,
        }
    }

    /// Accept a classified frame and evaluate the stop conditions
    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> SessionStep {
        self.frames.push(frame);
        self.elapsed_ms += self.frame_ms;

        if is_speech {
            self.silence_ms = 0;
            self.speech_frames += 1;
        } else {
            self.silence_ms += self.frame_ms;
        }

        if self.speech_frames > 0 && self.silence_ms >= self.silence_threshold_ms {
            return SessionStep::Complete;
        }

        if let Some(cap) = self.hard_cap_ms
            && self.elapsed_ms >= cap
        {
            return if self.speech_frames > 0 {
                SessionStep::Complete
            } else {
                SessionStep::NoSpeech
            };
        }

        SessionStep::Continue
    }

    /// Frames accepted so far
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Current run of consecutive silence
    #[must_use]
    pub const fn silence_ms(&self) -> u64 {
        self.silence_ms
    }

    /// Total captured time
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Whether any frame has been classified as speech
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.speech_frames > 0
    }

    /// Concatenate the accepted frames, trailing silence included
    ///
    /// # Errors
    ///
    /// Returns `NoSpeechDetected` if no frame was ever classified as speech
    pub fn finalize(self) -> Result<Utterance, CaptureError> {
        if self.speech_frames == 0 {
            return Err(CaptureError::NoSpeechDetected);
        }

        Ok(Utterance::from_frames(
            self.frames,
            self.sample_rate,
            self.frame_len,
        ))
    }
}

/// Runs the capture loop for a validated config and classifier
#[derive(Debug)]
pub struct UtteranceCapturer<C> {
    config: CaptureConfig,
    classifier: C,
}

impl<C: VoiceActivityClassifier> UtteranceCapturer<C> {
    /// Validate the config against the classifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pair is unusable
    pub fn new(config: CaptureConfig, classifier: C) -> Result<Self, CaptureError> {
        config.validate(&classifier)?;
        Ok(Self { config, classifier })
    }

    /// The validated config
    #[must_use]
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture one utterance, running until a stop condition or failure
    ///
    /// # Errors
    ///
    /// See [`CaptureError`]
    pub async fn capture<S>(&self, source: &mut S) -> Result<Utterance, CaptureError>
    where
        S: AudioFrameSource + ?Sized,
    {
        self.capture_until(source, &CancellationToken::new()).await
    }

    /// Capture one utterance, aborting with `Cancelled` once `cancel` fires
    ///
    /// # Errors
    ///
    /// See [`CaptureError`]
    pub async fn capture_until<S>(
        &self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Utterance, CaptureError>
    where
        S: AudioFrameSource + ?Sized,
    {
        let frame_len = self.config.frame_len();
        let mut session = CaptureSession::new(&self.config);
        self.classifier.reset();

        tracing::debug!(
            sample_rate = self.config.sample_rate,
            frame_ms = self.config.frame_duration_ms,
            silence_ms = self.config.silence_threshold_ms,
            hard_cap_ms = ?self.config.hard_cap_ms,
            classifier = self.classifier.name(),
            "recording"
        );

        loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(frames = session.frame_count(), "capture cancelled");
                    return Err(CaptureError::Cancelled);
                }
                frame = source.next_frame() => frame?,
            };

            if frame.len() != frame_len {
                return Err(CaptureError::DeviceFailure(format!(
                    "frame of {} samples, expected {frame_len}",
                    frame.len()
                )));
            }

            let is_speech = self.classifier.is_speech(&frame, self.config.sample_rate);
            let step = session.push(frame, is_speech);

            tracing::trace!(
                is_speech,
                silence_ms = session.silence_ms(),
                elapsed_ms = session.elapsed_ms(),
                "frame"
            );

            match step {
                SessionStep::Continue => {}
                SessionStep::Complete => {
                    tracing::debug!(
                        frames = session.frame_count(),
                        elapsed_ms = session.elapsed_ms(),
                        "utterance complete"
                    );
                    return session.finalize();
                }
                SessionStep::NoSpeech => {
                    tracing::debug!(elapsed_ms = session.elapsed_ms(), "hard cap without speech");
                    return Err(CaptureError::NoSpeechDetected);
                }
            }
        }
    }
}

/// Capture one utterance with a one-off capturer
///
/// The config is validated before the source is read.
///
/// # Errors
///
/// See [`CaptureError`]
pub async fn capture<S, C>(
    config: CaptureConfig,
    source: &mut S,
    classifier: C,
) -> Result<Utterance, CaptureError>
where
    S: AudioFrameSource + ?Sized,
    C: VoiceActivityClassifier,
{
    UtteranceCapturer::new(config, classifier)?
        .capture(source)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frame_ms: u32, silence_ms: i64, hard_cap_ms: Option<i64>) -> CaptureConfig {
        CaptureConfig {
            sample_rate: 16000,
            frame_duration_ms: frame_ms,
            silence_threshold_ms: silence_ms,
            hard_cap_ms,
            sensitivity: 2,
        }
    }

    #[test]
    fn test_silence_counter_resets_on_speech() {
        let cfg = config(20, 100, None);
        let mut session = CaptureSession::new(&cfg);
        let frame = || AudioFrame::silent(cfg.frame_len());

        assert_eq!(session.push(frame(), true), SessionStep::Continue);
        assert_eq!(session.push(frame(), false), SessionStep::Continue);
        assert_eq!(session.push(frame(), false), SessionStep::Continue);
        assert_eq!(session.silence_ms(), 40);

        assert_eq!(session.push(frame(), true), SessionStep::Continue);
        assert_eq!(session.silence_ms(), 0);
        assert_eq!(session.elapsed_ms(), 80);
    }

    #[test]
    fn test_leading_silence_does_not_complete() {
        let cfg = config(10, 50, None);
        let mut session = CaptureSession::new(&cfg);

        for _ in 0..20 {
            assert_eq!(
                session.push(AudioFrame::silent(cfg.frame_len()), false),
                SessionStep::Continue
            );
        }
        assert!(!session.heard_speech());
        assert_eq!(session.finalize(), Err(CaptureError::NoSpeechDetected));
    }

    #[test]
    fn test_zero_threshold_completes_on_speech() {
        let cfg = config(10, 0, None);
        let mut session = CaptureSession::new(&cfg);

        assert_eq!(
            session.push(AudioFrame::silent(cfg.frame_len()), false),
            SessionStep::Continue
        );
        assert_eq!(
            session.push(AudioFrame::silent(cfg.frame_len()), true),
            SessionStep::Complete
        );
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(config(10, 0, None).frame_len(), 160);
        assert_eq!(config(20, 0, None).frame_len(), 320);
        assert_eq!(config(30, 0, None).frame_len(), 480);
    }
}
