use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_live::session::SessionEnd;
use beacon_live::voice::{
    AudioCapture, CaptureEvent, CpalSink, OUTPUT_SAMPLE_RATE, PlaybackChunk, PlaybackEvent,
    PlaybackScheduler, Sensitivity, rms, samples_to_wav,
};
use beacon_live::{Config, Daemon};

/// Beacon Live - wake-word gated realtime voice assistant
#[derive(Parser)]
#[command(name = "beacon-live", version, about)]
struct Cli {
    /// Wake word sensitivity (Low, Medium, High)
    #[arg(short, long)]
    sensitivity: Option<Sensitivity>,

    /// Wake word to listen for
    #[arg(short, long)]
    wake_word: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output with gapless tones
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_live=info",
        1 => "info,beacon_live=debug",
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
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, output } => test_mic(duration, output).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    // Load configuration
    let mut config = Config::load()?;
    if let Some(level) = cli.sensitivity {
        config.sensitivity = level;
    }
    if let Some(word) = cli.wake_word {
        config.wake_word = word;
    }
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config)?;
    tracing::info!("beacon live starting - say \"{}\"", daemon.wake_word());

    match daemon.run().await? {
        SessionEnd::Failed(reason) => anyhow::bail!("session failed: {reason}"),
        end => tracing::info!(end = ?end, "beacon live stopped"),
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::channel(64);
    let mut capture = AudioCapture::new(tx)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    let mut recorded = Vec::new();
    let mut frames = 0_usize;

    loop {
        let event = tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            event = rx.recv() => event,
        };

        match event {
            Some(CaptureEvent::Frame(frame)) => {
                frames += 1;
                let energy = rms(frame.samples());
                let peak = frame.samples().iter().map(|s| s.abs()).fold(0.0f32, f32::max);

                // Visual meter
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let meter_len = (energy * 100.0).min(50.0) as usize;
                let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

                println!("[{frames:3}] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
                recorded.extend_from_slice(frame.samples());
            }
            Some(CaptureEvent::Fault(message)) => anyhow::bail!("capture failed: {message}"),
            None => break,
        }
    }

    capture.stop();

    if let Some(path) = output {
        let wav = samples_to_wav(&recorded, sample_rate)?;
        std::fs::write(&path, wav)?;
        println!("\nSaved {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output by scheduling three tones back to back
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear three rising tones with no gaps between them\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = PlaybackScheduler::new(CpalSink::new(tx)?);

    for frequency in [440.0_f32, 554.37, 659.25] {
        let scheduled = scheduler.enqueue(tone(frequency, 0.6))?;
        println!(
            "Tone {frequency:.0} Hz scheduled at {:.3}s for {:.3}s",
            scheduled.start, scheduled.duration
        );
    }

    let wait = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            match event {
                PlaybackEvent::Finished(id) => {
                    if scheduler.complete(id) {
                        return Ok(());
                    }
                }
                PlaybackEvent::Fault(message) => anyhow::bail!("playback failed: {message}"),
            }
        }
        Ok::<(), anyhow::Error>(())
    });
    wait.await
        .map_err(|_| anyhow::anyhow!("playback did not finish in time"))??;

    println!("\n---");
    println!("If you heard the tones, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Sine tone at 30% volume
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tone(frequency: f32, seconds: f32) -> PlaybackChunk {
    let rate = OUTPUT_SAMPLE_RATE as f32;
    let samples = (0..(rate * seconds) as usize)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate).sin() * 0.3)
        .collect();
    PlaybackChunk::mono(samples, OUTPUT_SAMPLE_RATE)
}
