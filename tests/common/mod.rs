//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;

use async_trait::async_trait;
use axum::Router;
use hamsa_voice::voice::{AudioFrame, AudioFrameSource, CaptureError, VoiceActivityClassifier};

/// Deterministic frame source fed from a script
pub struct ScriptedSource {
    frames: VecDeque<Result<AudioFrame, CaptureError>>,
    forever: Option<AudioFrame>,
    pending: bool,
    pulls: usize,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = AudioFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            forever: None,
            pending: false,
            pulls: 0,
        }
    }

    /// Script built from runs of `(is_speech, count)`
    pub fn from_pattern(frame_len: usize, pattern: &[(bool, usize)]) -> Self {
        let mut frames = Vec::new();
        for &(is_speech, count) in pattern {
            for _ in 0..count {
                let seed = frames.len();
                frames.push(if is_speech {
                    speech_frame(frame_len, seed)
                } else {
                    AudioFrame::silent(frame_len)
                });
            }
        }
        Self::new(frames)
    }

    /// Keep yielding `frame` once the script runs out
    pub fn then_forever(mut self, frame: AudioFrame) -> Self {
        self.forever = Some(frame);
        self
    }

    /// Never yield another frame once the script runs out
    pub fn then_pending(mut self) -> Self {
        self.pending = true;
        self
    }

    /// Fail with `error` once the script runs out
    pub fn then_fail(mut self, error: CaptureError) -> Self {
        self.frames.push_back(Err(error));
        self
    }

    /// Frames handed out so far
    pub fn pulls(&self) -> usize {
        self.pulls
    }
}

#[async_trait(?Send)]
impl AudioFrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<AudioFrame, CaptureError> {
        if let Some(next) = self.frames.pop_front() {
            if next.is_ok() {
                self.pulls += 1;
            }
            return next;
        }

        match &self.forever {
            Some(frame) => {
                self.pulls += 1;
                Ok(frame.clone())
            }
            None if self.pending => std::future::pending().await,
            None => Err(CaptureError::DeviceFailure("audio stream ended".to_string())),
        }
    }
}

/// Source whose next frame never arrives
pub struct PendingSource;

#[async_trait(?Send)]
impl AudioFrameSource for PendingSource {
    async fn next_frame(&mut self) -> Result<AudioFrame, CaptureError> {
        std::future::pending().await
    }
}

/// Classifies any frame with a non-zero sample as speech
pub struct MarkerClassifier;

impl VoiceActivityClassifier for MarkerClassifier {
    fn is_speech(&self, frame: &AudioFrame, _sample_rate: u32) -> bool {
        frame.samples().iter().any(|&s| s != 0)
    }

    fn name(&self) -> &'static str {
        "marker"
    }
}

/// [`MarkerClassifier`] that counts how often it was reset
#[derive(Default)]
pub struct ResetCounter {
    resets: std::cell::Cell<usize>,
}

impl ResetCounter {
    pub fn resets(&self) -> usize {
        self.resets.get()
    }
}

impl VoiceActivityClassifier for ResetCounter {
    fn is_speech(&self, frame: &AudioFrame, sample_rate: u32) -> bool {
        MarkerClassifier.is_speech(frame, sample_rate)
    }

    fn reset(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}

/// Frame of distinct non-zero samples, unique per `seed`
pub fn speech_frame(len: usize, seed: usize) -> AudioFrame {
    let samples = (0..len)
        .map(|i| i16::try_from((seed * 7 + i) % 1000 + 1).unwrap())
        .collect::<Vec<_>>();
    AudioFrame::new(samples)
}

/// Generate sine wave samples as i16
pub fn sine_samples(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let v = amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin();
            (v * f32::from(i16::MAX)) as i16
        })
        .collect()
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
