//! Modular Synth Engine - headless driver
//!
//! Builds a graph through intents, pulls samples from an output component and
//! reports on the rendered signal. Also serves as a line-oriented JSON control
//! surface.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use modular_engine::config::EngineConfig;
use modular_engine::dsp::{
    ComponentType, ModuleType, ParameterType, ParameterValue, PortClass, Socket, Waveform,
};
use modular_engine::engine::{create_engine, ComponentId, Controller, Intent};
use modular_engine::persistence;

#[derive(Parser, Debug)]
#[command(name = "modular-engine")]
#[command(author, version, about = "Headless modular synthesizer engine", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render an oscillator straight into an output and print signal stats.
    Tone {
        /// Oscillator frequency in Hz.
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f64,
        /// Waveform name (sine, square, triangle, saw, noise).
        #[arg(short, long, default_value_t = Waveform::Sine)]
        waveform: Waveform,
        /// Number of samples to pull.
        #[arg(short, long, default_value_t = 48_000)]
        samples: usize,
        /// Save the built graph as a patch file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Load a patch file and render from its first audio output.
    Patch {
        /// Patch file (JSON).
        path: PathBuf,
        /// Number of samples to pull.
        #[arg(short, long, default_value_t = 48_000)]
        samples: usize,
    },
    /// Read one JSON intent per line from stdin and print one outcome per line.
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config);

    match cli.command {
        Commands::Tone {
            frequency,
            waveform,
            samples,
            save,
        } => run_tone(&config, frequency, waveform, samples, save),
        Commands::Patch { path, samples } => run_patch(&config, &path, samples),
        Commands::Serve => run_serve(&config),
    }
}

fn init_tracing(config: &EngineConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn run_tone(
    config: &EngineConfig,
    frequency: f64,
    waveform: Waveform,
    samples: usize,
    save: Option<PathBuf>,
) -> anyhow::Result<()> {
    tracing::info!(frequency, %waveform, samples, "rendering tone");
    let (mut controller, mut processor) = create_engine(config);

    let osc = add(&mut controller, ModuleType::Oscillator, "osc")?;
    let out = add(&mut controller, ModuleType::AudioOutput, "out")?;
    for (parameter, value) in [
        (ParameterType::Frequency, ParameterValue::Double(frequency)),
        (ParameterType::Waveform, ParameterValue::Waveform(waveform)),
    ] {
        expect_success(&mut controller, Intent::SetParameter {
            id: osc,
            parameter,
            value,
        })?;
    }
    expect_success(&mut controller, Intent::CreateConnection {
        outbound: Socket::new(osc, 0, PortClass::AudioOut),
        inbound: Socket::new(out, 0, PortClass::AudioIn),
    })?;

    if let Some(path) = save {
        persistence::save_to_file(&controller.snapshot("tone"), &path)?;
        tracing::info!(path = %path.display(), "patch saved");
    }

    let mut buffer = vec![0.0f32; samples];
    processor.fill(out, &mut buffer);
    controller.poll_events();
    print_stats(&buffer, processor.context().sample_rate);
    Ok(())
}

fn run_patch(config: &EngineConfig, path: &Path, samples: usize) -> anyhow::Result<()> {
    let patch = persistence::load_from_file(path)?;
    let sink = patch
        .components
        .iter()
        .find(|c| c.component_type == ComponentType::Module(ModuleType::AudioOutput))
        .map(|c| c.id)
        .context("patch has no audio output")?;

    let (mut controller, mut processor) = create_engine(config);
    let rejected = controller
        .load_patch(&patch)
        .into_iter()
        .filter(|o| !o.is_success())
        .count();
    if rejected > 0 {
        tracing::warn!(rejected, "some patch intents were rejected");
    }

    let mut buffer = vec![0.0f32; samples];
    processor.fill(sink, &mut buffer);
    controller.poll_events();
    print_stats(&buffer, processor.context().sample_rate);
    Ok(())
}

/// Applies intents from stdin. One tick runs after each line so the
/// processing loop drains the command queue.
fn run_serve(config: &EngineConfig) -> anyhow::Result<()> {
    let (mut controller, mut processor) = create_engine(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = controller.apply_json(&line);
        writeln!(out, "{reply}")?;
        processor.tick();
        controller.poll_events();
    }
    Ok(())
}

fn add(controller: &mut Controller, ty: ModuleType, name: &str) -> anyhow::Result<ComponentId> {
    let payload = expect_success(controller, Intent::AddComponent {
        component_type: ComponentType::Module(ty),
        name: name.to_string(),
        id: None,
    })?;
    payload
        .get("id")
        .and_then(Value::as_u64)
        .context("add_component reply has no id")
}

fn expect_success(controller: &mut Controller, intent: Intent) -> anyhow::Result<Value> {
    let outcome = controller.apply(intent);
    if let Some(error) = outcome.error {
        bail!("{} failed: {}", outcome.action, error.message);
    }
    Ok(outcome.payload.unwrap_or(Value::Null))
}

fn print_stats(buffer: &[f32], sample_rate: f64) {
    let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let rms = if buffer.is_empty() {
        0.0
    } else {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    };
    let crossings = buffer
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count();
    let seconds = buffer.len() as f64 / sample_rate;

    println!("samples:   {}", buffer.len());
    println!("duration:  {seconds:.3} s");
    println!("peak:      {peak:.4}");
    println!("rms:       {rms:.4}");
    if seconds > 0.0 {
        println!("est. freq: {:.1} Hz", crossings as f64 / (2.0 * seconds));
    }
}
