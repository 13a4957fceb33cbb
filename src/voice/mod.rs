//! Voice processing module
//!
//! Handles voice-activity-gated capture, WAV packaging, playback, and the
//! Hamsa/Lahajati STT and TTS clients.

mod capture;
mod classifier;
mod frame;
mod microphone;
mod playback;
mod recorder;
pub mod stt;
pub mod tts;
pub mod wav;

pub use capture::{
    AudioFrameSource, CaptureConfig, CaptureError, CaptureSession, SessionStep, UtteranceCapturer,
    capture,
};
pub use classifier::{
    ClassifierKind, DEFAULT_ENERGY_THRESHOLD, EnergyClassifier, SUPPORTED_FRAME_MS,
    SUPPORTED_SAMPLE_RATES, VoiceActivityClassifier, WebRtcClassifier, rms,
};
pub use frame::{AudioFrame, MONO, Utterance};
pub use microphone::MicrophoneSource;
pub use playback::{AudioFormat, AudioPlayback, decode_mp3};
pub use recorder::record_for;
pub use stt::{HamsaStt, Transcriber};
pub use tts::{HamsaTts, HamsaVoice, LahajatiTts, LahajatiVoice, Synthesizer};
pub use wav::{pcm_to_wav, normalize_wav};
