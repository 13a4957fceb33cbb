//! Speech/silence classification of audio frames

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use webrtc_vad::{SampleRate, Vad, VadMode};

use super::capture::CaptureError;
use super::frame::AudioFrame;

/// Frame durations the WebRTC detector accepts
pub const SUPPORTED_FRAME_MS: [u32; 3] = [10, 20, 30];

/// Sample rates the WebRTC detector accepts
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Default RMS threshold for [`EnergyClassifier`]
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Decides whether a frame contains speech
///
/// Implementations must not touch capture state; the capturer only reads
/// the verdict. Detectors that adapt across frames clear that state in
/// [`reset`](Self::reset), which the capturer calls before every utterance.
pub trait VoiceActivityClassifier {
    /// Classify one frame
    fn is_speech(&self, frame: &AudioFrame, sample_rate: u32) -> bool;

    /// Forget anything learned from earlier utterances
    fn reset(&self) {}

    /// Whether frames of this duration and rate can be classified
    fn supports(&self, sample_rate: u32, frame_duration_ms: u32) -> bool {
        SUPPORTED_SAMPLE_RATES.contains(&sample_rate)
            && SUPPORTED_FRAME_MS.contains(&frame_duration_ms)
    }

    /// Short name for logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}

impl<T: VoiceActivityClassifier + ?Sized> VoiceActivityClassifier for Box<T> {
    fn is_speech(&self, frame: &AudioFrame, sample_rate: u32) -> bool {
        (**self).is_speech(frame, sample_rate)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn supports(&self, sample_rate: u32, frame_duration_ms: u32) -> bool {
        (**self).supports(sample_rate, frame_duration_ms)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: VoiceActivityClassifier + ?Sized> VoiceActivityClassifier for &T {
    fn is_speech(&self, frame: &AudioFrame, sample_rate: u32) -> bool {
        (**self).is_speech(frame, sample_rate)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn supports(&self, sample_rate: u32, frame_duration_ms: u32) -> bool {
        (**self).supports(sample_rate, frame_duration_ms)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Which classifier backs a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    /// WebRTC voice activity detector
///
/// The detector adapts to background noise across frames. Its state is
/// rebuilt on [`reset`](VoiceActivityClassifier::reset), so each utterance
/// starts from the same detector regardless of earlier turns.
pub struct WebRtcClassifier {
    vad: RefCell<Vad>,
    sample_rate: u32,
    sensitivity: u8,
}

impl fmt::Debug for WebRtcClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcClassifier")
            .field("sample_rate", &self.sample_rate)
            .field("sensitivity", &self.sensitivity)
            .finish_non_exhaustive()
    }
}

impl WebRtcClassifier {
    /// Create a detector for one sample rate
    ///
    /// Sensitivity 0..=3 maps to quality, low-bitrate, aggressive and
    /// very-aggressive modes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unsupported rates or sensitivity
    pub fn new(sample_rate: u32, sensitivity: u8) -> Result<Self, CaptureError> {
        let vad = build_vad(sample_rate, sensitivity)?;

        tracing::debug!(sample_rate, sensitivity, "webrtc VAD initialized");

        Ok(Self {
            vad: RefCell::new(vad),
            sample_rate,
            sensitivity,
        })
    }
}

fn build_vad(sample_rate: u32, sensitivity: u8) -> Result<Vad, CaptureError> {
    let rate = match sample_rate {
        8_000 => SampleRate::Rate8kHz,
        16_000 => SampleRate::Rate16kHz,
        32_000 => SampleRate::Rate32kHz,
        48_000 => SampleRate::Rate48kHz,
        other => {
            return Err(CaptureError::InvalidConfig(format!(
                "webrtc VAD does not support {other} Hz"
            )));
        }
    };

    let mode = match sensitivity {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        3 => VadMode::VeryAggressive,
        other => {
            return Err(CaptureError::InvalidConfig(format!(
                "sensitivity must be 0..=3, got {other}"
            )));
        }
    };

    Ok(Vad::new_with_rate_and_mode(rate, mode))
}

impl VoiceActivityClassifier for WebRtcClassifier {
    fn is_speech(&self, frame: &AudioFrame, sample_rate: u32) -> bool {
        if sample_rate != self.sample_rate {
            return false;
        }

        self.vad
            .borrow_mut()
            .is_voice_segment(frame.samples())
            .unwrap_or_else(|()| {
                tracing::trace!(samples = frame.len(), "webrtc VAD rejected frame");
                false
            })
    }

    fn reset(&self) {
        // Settings were validated in `new`
        if let Ok(vad) = build_vad(self.sample_rate, self.sensitivity) {
            *self.vad.borrow_mut() = vad;
        }
    }

    fn supports(&self, sample_rate: u32, frame_duration_ms: u32) -> bool {
        sample_rate == self.sample_rate && SUPPORTED_FRAME_MS.contains(&frame_duration_ms)
    }

    fn name(&self) -> &'static str {
        "webrtc"
    }
}

/// RMS energy gate
///
/// Deterministic: the same frame always gets the same verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

impl EnergyClassifier {
    /// Treat frames with RMS above `threshold` (0.0..=1.0) as speech
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Configured threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl VoiceActivityClassifier for EnergyClassifier {
    fn is_speech(&self, frame: &AudioFrame, _sample_rate: u32) -> bool {
        rms(frame.samples()) > self.threshold
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

/// RMS energy of i16 samples normalized to 0.0..=1.0
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = f64::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();

    #[allow(clippy::cast_possible_truncation)]
    let energy = (sum_squares / samples.len() as f64).sqrt() as f32;
    energy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: i16) -> AudioFrame {
        AudioFrame::new(
            (0..len)
                .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
                .collect(),
        )
    }

    #[test]
    fn test_rms() {
        assert!(rms(&[0; 160]) < 0.001);
        assert!(rms(&[16384; 160]) > 0.49);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_energy_classifier_verdicts() {
        let classifier = EnergyClassifier::default();

        assert!(!classifier.is_speech(&AudioFrame::silent(160), 16000));
        assert!(classifier.is_speech(&tone(160, 8000), 16000));
    }

    #[test]
    fn test_energy_classifier_is_deterministic() {
        let classifier = EnergyClassifier::new(0.1);
        let frame = tone(320, 3000);

        let first = classifier.is_speech(&frame, 16000);
        for _ in 0..10 {
            assert_eq!(classifier.is_speech(&frame, 16000), first);
        }
    }

    #[test]
    fn test_default_supported_frames() {
        let classifier = EnergyClassifier::default();

        assert!(classifier.supports(16000, 10));
        assert!(classifier.supports(48000, 30));
        assert!(!classifier.supports(16000, 17));
        assert!(!classifier.supports(44100, 20));
    }

    #[test]
    fn test_webrtc_rejects_bad_settings() {
        assert!(matches!(
            WebRtcClassifier::new(44100, 2),
            Err(CaptureError::InvalidConfig(_))
        ));
        assert!(matches!(
            WebRtcClassifier::new(16000, 4),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_webrtc_silence_is_not_speech() {
        let classifier = WebRtcClassifier::new(16000, 3).unwrap();

        assert!(!classifier.is_speech(&AudioFrame::silent(320), 16000));
        assert!(!classifier.supports(8000, 20));
        assert!(classifier.supports(16000, 20));
    }

    #[test]
    fn test_webrtc_reset_replays_same_verdicts() {
        let classifier = WebRtcClassifier::new(16000, 1).unwrap();
        let turn: Vec<AudioFrame> = (0..40)
            .map(|i| {
                if i % 3 == 0 {
                    AudioFrame::silent(160)
                } else {
                    tone(160, 2000 + i * 150)
                }
            })
            .collect();
        let run = |c: &WebRtcClassifier| -> Vec<bool> {
            turn.iter().map(|f| c.is_speech(f, 16000)).collect()
        };

        let first = run(&classifier);
        classifier.reset();
        let second = run(&classifier);

        assert_eq!(first, second);
    }

    #[test]
    fn test_classifier_kind_parse() {
        assert_eq!("webrtc".parse::<ClassifierKind>(), Ok(ClassifierKind::WebRtc));
        assert_eq!(" Energy ".parse::<ClassifierKind>(), Ok(ClassifierKind::Energy));
        assert!("neural".parse::<ClassifierKind>().is_err());
    }
}
