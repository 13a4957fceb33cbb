//! Conversation loop tests with scripted collaborators

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use hamsa_voice::llm::{ConversationHistory, Responder, Role};
use hamsa_voice::pipeline::{Listener, Speaker};
use hamsa_voice::voice::{CaptureConfig, CaptureError, Transcriber, Utterance, capture};
use hamsa_voice::{ConversationEnd, Error, PipelineOptions, Result, VoicePipeline};
use tokio_util::sync::CancellationToken;

mod common;

use common::{MarkerClassifier, ScriptedSource};

async fn utterance() -> Utterance {
    let config = CaptureConfig {
        silence_threshold_ms: 40,
        ..CaptureConfig::default()
    };
    let mut source = ScriptedSource::from_pattern(config.frame_len(), &[(true, 3), (false, 10)]);
    capture(config, &mut source, MarkerClassifier).await.unwrap()
}

/// Hands out scripted capture results, then reports cancellation
struct ScriptedListener {
    turns: VecDeque<std::result::Result<Utterance, CaptureError>>,
    calls: usize,
}

impl ScriptedListener {
    fn new(turns: Vec<std::result::Result<Utterance, CaptureError>>) -> Self {
        Self {
            turns: turns.into(),
            calls: 0,
        }
    }
}

#[async_trait(?Send)]
impl Listener for ScriptedListener {
    async fn listen(
        &mut self,
        _cancel: &CancellationToken,
    ) -> std::result::Result<Utterance, CaptureError> {
        self.calls += 1;
        self.turns.pop_front().unwrap_or(Err(CaptureError::Cancelled))
    }
}

struct ScriptedTranscriber {
    texts: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedTranscriber {
    fn new(texts: Vec<Result<String>>) -> Self {
        Self {
            texts: Mutex::new(texts.into()),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        assert_eq!(&wav[0..4], b"RIFF");
        self.texts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("again".to_string()))
    }
}

/// Echoes the latest user message and records the history length it saw
#[derive(Default)]
struct EchoResponder {
    seen: Mutex<Vec<usize>>,
    fail: bool,
}

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, history: &ConversationHistory) -> Result<String> {
        self.seen.lock().unwrap().push(history.len());
        if self.fail {
            return Err(Error::Llm("backend down".to_string()));
        }
        let last = history.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        Ok(format!("you said {}", last.content))
    }
}

#[derive(Default)]
struct RecordingSpeaker {
    spoken: Vec<String>,
}

#[async_trait(?Send)]
impl Speaker for RecordingSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.push(text.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_farewell_ends_after_reply_is_spoken() {
    let listener = ScriptedListener::new(vec![Ok(utterance().await), Ok(utterance().await)]);
    let transcriber = ScriptedTranscriber::new(vec![
        Ok("what's the weather".to_string()),
        Ok("ok bye".to_string()),
    ]);
    let mut pipeline = VoicePipeline::new(
        listener,
        transcriber,
        EchoResponder::default(),
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(Some("be brief"));
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::Farewell);
    assert_eq!(history.len(), 5);
    assert_eq!(history.turns(), 2);

    let (listener, _, responder, speaker) = pipeline.into_parts();
    assert_eq!(listener.calls, 2);
    assert_eq!(*responder.seen.lock().unwrap(), vec![2, 4]);
    assert_eq!(
        speaker.spoken,
        vec!["you said what's the weather", "you said ok bye"]
    );
}

#[tokio::test]
async fn test_no_speech_reprompts_and_continues() {
    let listener = ScriptedListener::new(vec![
        Err(CaptureError::NoSpeechDetected),
        Ok(utterance().await),
    ]);
    let transcriber = ScriptedTranscriber::new(vec![Ok("مع السلامة".to_string())]);
    let options = PipelineOptions {
        reprompt: Some("I didn't catch that".to_string()),
        ..PipelineOptions::default()
    };
    let mut pipeline = VoicePipeline::new(
        listener,
        transcriber,
        EchoResponder::default(),
        RecordingSpeaker::default(),
        options,
    );

    let mut history = ConversationHistory::new(None);
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::Farewell);
    let (_, _, _, speaker) = pipeline.into_parts();
    assert_eq!(speaker.spoken[0], "I didn't catch that");
    assert_eq!(speaker.spoken.len(), 2);
}

#[tokio::test]
async fn test_no_speech_without_reprompt_is_silent() {
    let listener = ScriptedListener::new(vec![Err(CaptureError::NoSpeechDetected)]);
    let mut pipeline = VoicePipeline::new(
        listener,
        ScriptedTranscriber::new(vec![]),
        EchoResponder::default(),
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(None);
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::Cancelled);
    assert!(history.is_empty());
    let (_, _, _, speaker) = pipeline.into_parts();
    assert!(speaker.spoken.is_empty());
}

#[tokio::test]
async fn test_failed_or_empty_transcript_skips_turn() {
    let listener = ScriptedListener::new(vec![
        Ok(utterance().await),
        Ok(utterance().await),
        Ok(utterance().await),
    ]);
    let transcriber = ScriptedTranscriber::new(vec![
        Err(Error::Stt("timeout".to_string())),
        Ok("   ".to_string()),
        Ok("bye".to_string()),
    ]);
    let mut pipeline = VoicePipeline::new(
        listener,
        transcriber,
        EchoResponder::default(),
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(None);
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::Farewell);
    assert_eq!(history.len(), 2);
    let (_, _, responder, _) = pipeline.into_parts();
    assert_eq!(responder.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_responder_failure_rolls_back_history() {
    let listener = ScriptedListener::new(vec![Ok(utterance().await)]);
    let transcriber = ScriptedTranscriber::new(vec![Ok("hello".to_string())]);
    let responder = EchoResponder {
        fail: true,
        ..EchoResponder::default()
    };
    let mut pipeline = VoicePipeline::new(
        listener,
        transcriber,
        responder,
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(Some("system"));
    let result = pipeline.run(&mut history, &CancellationToken::new()).await;

    assert!(matches!(result, Err(Error::Llm(_))));
    assert_eq!(history.len(), 1);
    assert_eq!(history.system_prompt(), Some("system"));
}

#[tokio::test]
async fn test_turn_limit() {
    let listener = ScriptedListener::new(vec![
        Ok(utterance().await),
        Ok(utterance().await),
        Ok(utterance().await),
    ]);
    let options = PipelineOptions {
        max_turns: Some(2),
        ..PipelineOptions::default()
    };
    let mut pipeline = VoicePipeline::new(
        listener,
        ScriptedTranscriber::new(vec![]),
        EchoResponder::default(),
        RecordingSpeaker::default(),
        options,
    );

    let mut history = ConversationHistory::new(None);
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::TurnLimit);
    assert_eq!(history.turns(), 2);
    let (listener, _, _, _) = pipeline.into_parts();
    assert_eq!(listener.calls, 2);
}

#[tokio::test]
async fn test_cancellation_ends_cleanly() {
    let listener = ScriptedListener::new(vec![Err(CaptureError::Cancelled)]);
    let mut pipeline = VoicePipeline::new(
        listener,
        ScriptedTranscriber::new(vec![]),
        EchoResponder::default(),
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(None);
    let end = pipeline
        .run(&mut history, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, ConversationEnd::Cancelled);
}

#[tokio::test]
async fn test_device_failure_propagates() {
    let listener = ScriptedListener::new(vec![Err(CaptureError::DeviceFailure(
        "no input device".to_string(),
    ))]);
    let mut pipeline = VoicePipeline::new(
        listener,
        ScriptedTranscriber::new(vec![]),
        EchoResponder::default(),
        RecordingSpeaker::default(),
        PipelineOptions::default(),
    );

    let mut history = ConversationHistory::new(None);
    let result = pipeline.run(&mut history, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(Error::Capture(CaptureError::DeviceFailure(_)))
    ));
}
