use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hamsa_voice::mcp::{self, McpClient, ToolPlanner};
use hamsa_voice::pipeline::{Listener, MicrophoneListener, PlaybackSpeaker, VoicePipeline};
use hamsa_voice::voice::wav::normalize_wav_bytes;
use hamsa_voice::voice::{
    AudioPlayback, CaptureConfig, MicrophoneSource, Synthesizer, Transcriber,
    VoiceActivityClassifier, record_for, rms,
};
use hamsa_voice::{Config, ConversationEnd, ConversationHistory, Responder};

/// Hamsa Voice - Arabic voice assistant and MCP tool scaffold
#[derive(Parser)]
#[command(name = "hamsa-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "HAMSA_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the live voice conversation (default)
    Converse {
        /// Record a fixed number of seconds per turn instead of waiting for silence
        #[arg(long)]
        fixed_secs: Option<u64>,
        /// Stop after this many turns
        #[arg(long)]
        max_turns: Option<usize>,
    },
    /// Capture one utterance and save it as WAV
    Record {
        /// Output file
        #[arg(short, long, default_value = "utterance.wav")]
        output: PathBuf,
        /// Record a fixed number of seconds instead of waiting for silence
        #[arg(long)]
        fixed_secs: Option<u64>,
    },
    /// Transcribe a WAV file
    Transcribe {
        /// WAV file to transcribe
        path: PathBuf,
        /// Language code
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Synthesize text and play it
    Speak {
        /// Text to speak
        text: String,
        /// TTS backend
        #[arg(short, long, value_enum, default_value_t = TtsBackend::Hamsa)]
        provider: TtsBackend,
        /// Save the audio instead of playing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Ask the language model a one-shot question
    Ask {
        /// Prompt to send
        prompt: String,
    },
    /// Serve the MCP tools over HTTP
    ServeMcp {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Let the language model pick and run MCP tools for a request
    Tools {
        /// What you want done; read from stdin when omitted
        request: Option<String>,
        /// MCP endpoint
        #[arg(long)]
        url: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[derive(Clone, Copy, ValueEnum)]
enum TtsBackend {
    Hamsa,
    Lahajati,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = match verbose {
        0 => "info,hamsa_voice=info",
        1 => "info,hamsa_voice=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Command::Converse {
        fixed_secs: None,
        max_turns: None,
    });

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match command {
        Command::Converse {
            fixed_secs,
            max_turns,
        } => converse(&config, fixed_secs, max_turns).await,
        Command::Record { output, fixed_secs } => record(&config, &output, fixed_secs).await,
        Command::Transcribe { path, language } => transcribe(&config, &path, language).await,
        Command::Speak {
            text,
            provider,
            output,
        } => speak(&config, &text, provider, output.as_deref()).await,
        Command::Ask { prompt } => ask(&config, &prompt).await,
        Command::ServeMcp { host, port } => serve_mcp(&config, host, port).await,
        Command::Tools { request, url } => tools(&config, request, url).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker(),
    }
}

/// Cancellation token fired by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            trigger.cancel();
        }
    });
    token
}

type DynListener = MicrophoneListener<Box<dyn VoiceActivityClassifier>>;

fn microphone_listener(config: &Config, fixed_secs: Option<u64>) -> anyhow::Result<DynListener> {
    let capture = config.capture.to_capture_config();
    let classifier = config.capture.classifier.build(
        capture.sample_rate,
        capture.sensitivity,
        config.capture.energy_threshold,
    )?;

    let listener = MicrophoneListener::new(capture, classifier)?;
    Ok(match fixed_secs {
        Some(secs) => listener.with_fixed_duration(secs.saturating_mul(1000)),
        None => listener,
    })
}

/// Live listen → transcribe → respond → speak loop
#[allow(clippy::future_not_send)]
async fn converse(
    config: &Config,
    fixed_secs: Option<u64>,
    max_turns: Option<usize>,
) -> anyhow::Result<()> {
    let listener = microphone_listener(config, fixed_secs)?;
    let transcriber = config.stt.client()?;
    let responder = config.llm.responder()?;
    let speaker = PlaybackSpeaker::new(config.tts.client()?, AudioPlayback::new()?);

    let mut options = config.conversation.pipeline_options();
    if max_turns.is_some() {
        options.max_turns = max_turns;
    }

    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        classifier = %config.capture.classifier,
        "voice assistant ready, press Ctrl-C to stop"
    );

    let cancel = ctrl_c_token();
    let mut history = ConversationHistory::new(Some(&config.llm.system_prompt));
    let mut pipeline = VoicePipeline::new(listener, transcriber, responder, speaker, options);

    let end = pipeline.run(&mut history, &cancel).await?;
    match end {
        ConversationEnd::Farewell => tracing::info!("goodbye"),
        ConversationEnd::Cancelled => tracing::info!("conversation cancelled"),
        ConversationEnd::TurnLimit => tracing::info!("turn limit reached"),
    }
    tracing::info!(turns = history.turns(), "conversation finished");

    Ok(())
}

/// Capture one utterance to a WAV file
#[allow(clippy::future_not_send)]
async fn record(config: &Config, output: &Path, fixed_secs: Option<u64>) -> anyhow::Result<()> {
    let mut listener = microphone_listener(config, fixed_secs)?;
    let cancel = ctrl_c_token();

    println!("Recording... speak now");
    let utterance = listener.listen(&cancel).await?;
    std::fs::write(output, utterance.to_wav()?)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "Saved {} ms ({} frames) to {}",
        utterance.duration_ms(),
        utterance.frame_count(),
        output.display()
    );
    Ok(())
}

async fn transcribe(
    config: &Config,
    path: &Path,
    language: Option<String>,
) -> anyhow::Result<()> {
    let stt = config.stt.client()?;
    let raw = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let wav = normalize_wav_bytes(&raw)?;

    let text = match language {
        Some(language) => stt.transcribe_in(&wav, &language).await?,
        None => stt.transcribe(&wav).await?,
    };
    println!("{text}");
    Ok(())
}

async fn speak(
    config: &Config,
    text: &str,
    provider: TtsBackend,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let synthesizer: Box<dyn Synthesizer> = match provider {
        TtsBackend::Hamsa => Box::new(config.tts.client()?),
        TtsBackend::Lahajati => Box::new(config.tts.lahajati.client()?),
    };

    let audio = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio", audio.len());

    if let Some(path) = output {
        std::fs::write(path, &audio)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("Saved to {}", path.display());
        return Ok(());
    }

    AudioPlayback::new()?.play_bytes(&audio)?;
    Ok(())
}

async fn ask(config: &Config, prompt: &str) -> anyhow::Result<()> {
    let responder = config.llm.responder()?;
    let answer = responder.complete(prompt).await?;
    println!("{answer}");
    Ok(())
}

async fn serve_mcp(
    config: &Config,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut settings = config.mcp.clone();
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }

    let registry = mcp::builtin_tools(
        config.llm.responder().ok(),
        config.stt.client().ok().map(Arc::new),
        config.tts.client().ok().map(Arc::new),
    );

    mcp::serve(&settings.bind_addr(), registry).await?;
    Ok(())
}

async fn tools(
    config: &Config,
    request: Option<String>,
    url: Option<String>,
) -> anyhow::Result<()> {
    let url = url.unwrap_or_else(|| config.mcp.url.clone());
    let client = McpClient::connect(url).await?;

    let definitions = client.list_tools().await?;
    let names: Vec<&str> = definitions.iter().map(|t| t.name.as_str()).collect();
    println!("Available tools: {names:?}");

    let request = match request {
        Some(request) => request,
        None => {
            print!("What is on your mind? ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    let planner = ToolPlanner::new(config.llm.responder()?);
    let report = planner.run(&definitions, &request, &client).await?;

    if report.fell_back {
        println!("LLM unavailable, fell back to the first tool");
    }
    if !report.explanation.is_empty() {
        println!("Explanation: {}", report.explanation);
    }
    for name in &report.skipped {
        println!("Warning: tool '{name}' not found");
    }
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(result) if result.is_error => {
                println!("{} failed: {}", outcome.tool, result.joined_text());
            }
            Ok(result) => println!("{}: {}", outcome.tool, result.joined_text()),
            Err(e) => println!("{} error: {e}", outcome.tool),
        }
    }

    Ok(())
}

/// Test microphone input with a per-second level meter
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = CaptureConfig {
        hard_cap_ms: None,
        ..config.capture.to_capture_config()
    };
    let mut source = MicrophoneSource::open(&capture)?;
    let cancel = ctrl_c_token();

    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    for i in 0..duration {
        let second = record_for(&capture, &mut source, 1000, &cancel).await?;
        let energy = rms(second.samples());
        let peak = second
            .samples()
            .iter()
            .map(|s| f32::from(s.unsigned_abs()) / 32768.0)
            .fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 16_000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.play(&samples, sample_rate)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}
