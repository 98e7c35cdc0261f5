//! Tingle CLI — plays or renders a scripted touch session.

mod script;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tingle_engine::output::list_output_devices;
use tingle_engine::{Catalog, EngineConfig, TouchAudioEngine};

use crate::script::{drive_offline, perform, Head, Script};

#[derive(Parser)]
#[command(name = "tingle", version, about = "Spatial touch-to-sound demo player")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List output devices
    Devices,
    /// List built-in sounds
    Catalog,
    /// Play the demo script on an output device
    Play {
        /// Output device name (default: host default)
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        sample_rate: Option<u32>,
        #[arg(long)]
        channels: Option<u16>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Render the demo script to a WAV file
    Render {
        /// Output .wav path
        output: PathBuf,
        #[arg(long, default_value_t = EngineConfig::OFFLINE_SAMPLE_RATE)]
        sample_rate: u32,
        /// Write 16-bit integer samples instead of 32-bit float
        #[arg(long)]
        int16: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct SessionArgs {
    /// Master gain, 0..1.5
    #[arg(long, default_value_t = tingle_engine::mixer::DEFAULT_MASTER_GAIN)]
    gain: f32,
    /// Head yaw in degrees
    #[arg(long, default_value_t = 0.0)]
    yaw: f32,
}

fn print_catalog() {
    let catalog = Catalog::builtin();
    println!("{:<16} {:<13} {:>6} {:>6} {:>5}  trigger", "id", "category", "dur", "gain", "seed");
    for s in catalog.iter() {
        println!(
            "{:<16} {:<13} {:>6.2} {:>6.2} {:>5}  {:?}{}",
            s.id(),
            s.category().as_str(),
            s.duration(),
            s.base_gain(),
            s.seed(),
            s.trigger(),
            if s.looping() { " (loop)" } else { "" },
        );
    }
}

fn play(config: EngineConfig, session: SessionArgs) -> Result<()> {
    let catalog = Catalog::builtin();
    let head = Head::new(session.yaw);
    let script = Script::demo();

    let mut engine = TouchAudioEngine::with_default_output(config);
    engine.resume_context().context("starting output")?;
    info!(
        sample_rate = engine.sample_rate().unwrap_or_default(),
        seconds = script.length_s(),
        "playing demo"
    );

    let start = Instant::now();
    for cue in script.cues() {
        if let Some(wait) = Duration::from_secs_f64(cue.at).checked_sub(start.elapsed()) {
            thread::sleep(wait);
        }
        perform(&mut engine, &catalog, &head, &cue.action)?;
        engine.collect_ended();
    }
    if let Some(wait) = Duration::from_secs_f64(script.length_s()).checked_sub(start.elapsed()) {
        thread::sleep(wait);
    }
    engine.dispose()?;
    Ok(())
}

fn render(output: &Path, sample_rate: u32, int16: bool, session: SessionArgs) -> Result<()> {
    let catalog = Catalog::builtin();
    let head = Head::new(session.yaw);
    let script = Script::demo();

    let config = EngineConfig { master_gain: session.gain, ..EngineConfig::offline(sample_rate) };
    let (mut engine, handle) = TouchAudioEngine::offline(config);
    engine.resume_context()?;

    let spec = hound::WavSpec {
        channels: handle.channels(),
        sample_rate,
        bits_per_sample: if int16 { 16 } else { 32 },
        sample_format: if int16 { hound::SampleFormat::Int } else { hound::SampleFormat::Float },
    };
    let mut writer =
        hound::WavWriter::create(output, spec).with_context(|| format!("creating {}", output.display()))?;

    let frames = drive_offline(&mut engine, &handle, &catalog, &head, &script, sample_rate, |block| {
        for &s in block {
            if int16 {
                writer.write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
            } else {
                writer.write_sample(s)?;
            }
        }
        Ok(())
    })?;
    writer.finalize()?;
    engine.dispose()?;

    info!(frames, path = %output.display(), "rendered");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Devices => {
            println!("Available output devices:");
            for name in list_output_devices()? {
                println!("- {name}");
            }
        }
        Command::Catalog => print_catalog(),
        Command::Play { device, sample_rate, channels, session } => {
            let config = EngineConfig {
                sample_rate,
                channels,
                device_name: device,
                master_gain: session.gain,
                ..EngineConfig::default()
            };
            play(config, session)?;
        }
        Command::Render { output, sample_rate, int16, session } => render(&output, sample_rate, int16, session)?,
    }
    Ok(())
}
