use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inocencio::assistant::ConsolePresenter;
use inocencio::voice::{
    AttachedSource, AudioCapture, AudioPayload, AudioPlayback, LevelMeter, ResponsePlayer,
    SilenceAwareRecorder, SpeechToText, TranscribingEngine,
};
use inocencio::{
    Command, Components, Config, Controller, ControllerHandle, VoiceApiClient, VoiceBackend,
};

/// Inocêncio - wake-word virtual receptionist
#[derive(Parser)]
#[command(name = "inocencio", version, about)]
struct Cli {
    /// Path to a config file (default: <config dir>/inocencio/config.toml)
    #[arg(short, long, env = "INOCENCIO_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print a session snapshot on every phase change
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the receptionist (default)
    Run,
    /// Check that the voice API is reachable
    Check,
    /// Send a recorded question and play the answer
    Ask {
        /// WAV file with the question
        file: PathBuf,
    },
    /// Show the microphone level against the silence threshold
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play a test tone
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,inocencio=info",
        1 => "info,inocencio=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.debug {
        config.session.debug = true;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run_receptionist(config).await,
        Cmd::Check => check(&config).await,
        Cmd::Ask { file } => ask(&config, &file).await,
        Cmd::TestMic { duration } => test_mic(&config, duration).await,
        Cmd::TestSpeaker => test_speaker().await,
    }
}

/// Start up and run the receptionist until interrupted
#[allow(clippy::future_not_send)]
async fn run_receptionist(config: Config) -> anyhow::Result<()> {
    tracing::info!(api = %config.api.base_url, "starting receptionist");

    // Recognizer capability
    let stt = Arc::new(SpeechToText::new(&config.stt, &config.wake.language)?);

    // API liveness
    let api = VoiceApiClient::new(&config.api)?;
    if let Err(e) = api.probe().await {
        tracing::warn!(error = %e, "voice API not reachable yet, continuing");
    }

    // Microphone, opened once for the whole session
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    tracing::info!("microphone authorized");

    let player = AudioPlayback::new()?;
    let tap = Arc::new(capture.tap());

    let components = Components {
        engine: Box::new(TranscribingEngine::new(Arc::clone(&tap), stt)),
        recorder: Box::new(SilenceAwareRecorder::new(tap, config.capture.clone())),
        backend: Arc::new(api),
        player: Arc::new(player),
        presenter: Box::new(ConsolePresenter),
    };

    let controller = Controller::new(config, components)?;
    let handle = controller.handle();

    let console_handle = handle.clone();
    std::thread::spawn(move || console(console_handle));
    tokio::spawn(shutdown_on_ctrl_c(handle));

    controller.run().await;
    capture.stop();

    Ok(())
}

/// Read operator commands from stdin
///
/// Runs on a plain thread so a blocked read never holds up process exit.
fn console(handle: ControllerHandle) {
    for line in std::io::stdin().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "console input failed");
                break;
            }
        };

        let sent = match line.trim() {
            "" => continue,
            "force" => handle.command(Command::Activate { forced: true }),
            "test" => handle.command(Command::Activate { forced: false }),
            "stop" => handle.command(Command::StopCapture),
            "recover" => handle.command(Command::Recover),
            "quit" | "exit" => handle.command(Command::Shutdown),
            "status" => {
                match serde_json::to_string_pretty(&handle.snapshot()) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::warn!(error = %e, "failed to serialize snapshot"),
                }
                true
            }
            other => {
                println!("unknown command: {other} (force, test, stop, status, recover, quit)");
                true
            }
        };

        if !sent {
            break;
        }
    }
}

async fn shutdown_on_ctrl_c(handle: ControllerHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("interrupted");
        handle.command(Command::Shutdown);
    }
}

/// Probe the voice API
async fn check(config: &Config) -> anyhow::Result<()> {
    let api = VoiceApiClient::new(&config.api)?;
    api.probe().await?;
    println!("Voice API at {} is reachable", api.base_url());
    Ok(())
}

/// Submit a recorded question and play the reply
async fn ask(config: &Config, file: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file).await?;
    let question = AudioPayload::wav(bytes);
    if !question.is_wav() {
        anyhow::bail!("{} is not a WAV file", file.display());
    }

    let api = VoiceApiClient::new(&config.api)?;
    println!("Sending {:.2}KB to {}...", question.kib(), api.base_url());
    let reply = api.submit(question).await?;
    println!("Got {:.2}KB of {} audio", reply.kib(), reply.content_type);

    let player = AudioPlayback::new()?;
    player.play(reply).await?;

    Ok(())
}

/// Show the live level next to the silence threshold
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, seconds: u64) -> anyhow::Result<()> {
    let threshold = config.capture.silence_threshold;
    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!(
        "Listening for {seconds}s at {} Hz, silence below {threshold:.3}. Speak now!\n",
        capture.sample_rate()
    );

    let attached = AttachedSource::new(Arc::new(capture.tap()));
    let mut meter = LevelMeter::new(config.capture.level_window);
    let mut frames = tokio::time::interval(config.capture.frame_interval);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut loud_frames = 0_u32;

    while tokio::time::Instant::now() < deadline {
        frames.tick().await;
        let level = meter.push(&attached.take());
        let heard = level >= threshold;
        if heard {
            loud_frames += 1;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bar = (level * 200.0).min(40.0) as usize;
        print!(
            "\r{} {level:.4} [{:<40}]",
            if heard { "SOM     " } else { "SILENCIO" },
            "#".repeat(bar)
        );
        std::io::Write::flush(&mut std::io::stdout())?;
    }
    drop(attached);
    capture.stop();

    println!("\n\n{loud_frames} frames above the silence threshold.");
    if loud_frames == 0 {
        println!("Nothing was heard: check the input device or lower capture.silence_threshold.");
    }

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;
    let rate = playback.sample_rate();

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..rate * 2)
        .map(|i| {
            let t = i as f32 / rate as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {rate} Hz...", samples.len());

    playback.play_samples(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}
