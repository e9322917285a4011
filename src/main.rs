use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use voicelink::{
    AppConfig, AudioDevice, CaptureEvent, ConversationController, ConversationOptions,
    ConversationState, CpalDevice, CredentialBroker, PeerTransport, SessionSignal,
};

/// Voicelink - real-time voice conversation client
#[derive(Parser, Debug)]
#[command(name = "voicelink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model to converse with (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Voice for synthesized audio (overrides config)
    #[arg(long)]
    voice: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a short sample from the microphone and play it back, without
    /// touching the network. Useful for checking the audio devices.
    SelfTest {
        /// How long to record, in seconds
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

/// What the interaction loop should do next.
enum Flow {
    Line(Option<String>),
    Signal(SessionSignal),
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Some(Commands::SelfTest { seconds }) = cli.command {
        return self_test(seconds).await;
    }

    let mut config = match cli.config {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::from_env()?,
    };
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(voice) = cli.voice {
        config.voice = voice;
    }
    info!(model = %config.model, voice = %config.voice, "configuration loaded");

    let broker = CredentialBroker::new(config.api_base.clone(), config.api_key.to_string());
    let transport = Box::new(PeerTransport::new(
        config.api_base.clone(),
        config.model.clone(),
    ));
    let device = Arc::new(CpalDevice::new());
    let mut controller = ConversationController::new(
        broker,
        transport,
        device,
        ConversationOptions {
            model: config.model.clone(),
            voice: config.voice.clone(),
            modalities: config.modalities.clone(),
            instructions: config.instructions.clone(),
        },
    );

    println!("Press Enter to start a conversation, Enter again to end it, q to quit.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let flow = tokio::select! {
            _ = tokio::signal::ctrl_c() => Flow::Quit,
            line = lines.next_line() => Flow::Line(line?),
            signal = controller.next_signal() => Flow::Signal(signal),
        };

        match flow {
            Flow::Quit | Flow::Line(None) => break,
            Flow::Line(Some(line)) if line.trim() == "q" => break,
            Flow::Line(Some(_)) => match controller.state() {
                ConversationState::Idle => match controller.begin().await {
                    Ok(()) => println!("Conversation started - speak now. Press Enter to end."),
                    Err(e) => error!("could not start conversation: {e}"),
                },
                _ => {
                    controller.end().await?;
                    println!("Conversation ended.");
                }
            },
            Flow::Signal(signal) => {
                if let Err(e) = controller.handle_signal(signal).await {
                    error!("conversation aborted: {e}");
                    println!("Conversation ended.");
                }
            }
        }
    }

    // Graceful shutdown: release the device and connection before exit.
    info!("shutting down");
    controller.end().await?;
    Ok(())
}

/// Loopback diagnostic: capture for a few seconds, then play it back.
async fn self_test(seconds: u64) -> anyhow::Result<()> {
    let device = CpalDevice::new();
    let (sink_tx, mut sink_rx) = mpsc::channel(1024);

    println!("Recording {seconds}s from the default microphone...");
    device
        .start_capture(sink_tx)
        .map_err(|e| anyhow!("could not start capture: {e}"))?;

    let mut frames = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = sink_rx.recv() => match event {
                Some(CaptureEvent::Frame(frame)) => frames.push(frame),
                Some(CaptureEvent::Failed(e)) => return Err(anyhow!("capture failed: {e}")),
                None => break,
            },
        }
    }
    device.stop_capture();

    let captured_ms: u64 = frames.iter().map(|f| f.duration_ms()).sum();
    println!("Captured {} frames ({captured_ms} ms), playing back...", frames.len());

    for frame in frames {
        device
            .render(frame)
            .map_err(|e| anyhow!("playback failed: {e}"))?;
    }
    tokio::time::sleep(Duration::from_millis(captured_ms + 500)).await;
    println!("Self-test complete.");
    Ok(())
}
