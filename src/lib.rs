//! Hamsa Voice - voice assistant loop and MCP tool scaffold
//!
//! This library provides:
//! - Voice-activity-gated utterance capture over fixed-size PCM frames
//! - Hamsa STT/TTS and Lahajati TTS clients
//! - `OpenAI`, Cerebras and Gemini chat backends
//! - A listen → transcribe → respond → speak conversation loop
//! - A small MCP server, client and LLM tool selector
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Pipeline                         │
//! │   Listener  │  Transcriber  │  Responder  │  Speaker  │
//! └──────┬──────────────┬──────────────┬───────────┬─────┘
//!        │              │              │           │
//! ┌──────▼──────┐ ┌─────▼─────┐ ┌──────▼─────┐ ┌───▼──────┐
//! │   Capture   │ │ Hamsa STT │ │ Chat / LLM │ │ TTS +    │
//! │ VAD + frames│ │           │ │            │ │ playback │
//! └─────────────┘ └───────────┘ └────────────┘ └──────────┘
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use llm::{ConversationHistory, LlmProvider, Responder};
pub use pipeline::{ConversationEnd, PipelineOptions, VoicePipeline};
pub use voice::{CaptureConfig, CaptureError, Utterance, UtteranceCapturer};
