//! Crescendo CLI - offline loudness processing
//!
//! Runs the engine over WAV files for tuning and verification work.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use crescendo::dsp::CrossoverLayout;
use crescendo::engine::{Engine, EngineConfig};
use crescendo::error::{CrescendoError, Result};
use crescendo::params::Parameters;
use crescendo::registry::EffectRegistry;

#[derive(Parser)]
#[command(name = "crescendo", version, about = "Multi-band loudness enhancement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a WAV file through the loudness engine
    Process {
        /// Input WAV file
        #[arg(short, long)]
        input: String,
        /// Output WAV file
        #[arg(short, long)]
        output: String,
        /// Crossover frequencies in Hz, ascending (e.g. 200,2000)
        #[arg(long, value_delimiter = ',')]
        crossovers: Option<Vec<f32>>,
        /// Processing block size in frames
        #[arg(long, default_value_t = 512)]
        block_size: usize,
        /// Parameter tuning file (JSON, as written by `defaults`)
        #[arg(long)]
        tuning: Option<String>,
        /// Individual control overrides, e.g. --set band1.gain_db=6
        #[arg(long = "set", value_name = "NAME=VALUE")]
        sets: Vec<String>,
        /// Pass input through unchanged
        #[arg(long)]
        bypass: bool,
    },
    /// Print a default parameter tuning as JSON
    Defaults {
        /// Number of bands
        #[arg(long, default_value_t = 3)]
        bands: usize,
    },
    /// List registered effects
    Effects,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        eprintln!("error [{}]: {}", err.error_code(), err);
        std::process::exit(1);
    }
}

fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Process {
            input,
            output,
            crossovers,
            block_size,
            tuning,
            sets,
            bypass,
        } => process_file(
            &input, &output, crossovers, block_size, tuning, sets, bypass,
        ),
        Commands::Defaults { bands } => {
            let params = Parameters::defaults(bands);
            params.validate()?;
            println!("{}", serde_json::to_string_pretty(&params)?);
            Ok(())
        }
        Commands::Effects => {
            for name in EffectRegistry::with_builtins().names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn process_file(
    input: &str,
    output: &str,
    crossovers: Option<Vec<f32>>,
    block_size: usize,
    tuning: Option<String>,
    sets: Vec<String>,
    bypass: bool,
) -> Result<()> {
    let mut reader = hound::WavReader::open(input)?;
    let spec = reader.spec();
    let samples = read_samples(&mut reader)?;
    info!(
        "loaded {}: {} Hz, {} ch, {} frames",
        input,
        spec.sample_rate,
        spec.channels,
        samples.len() / spec.channels as usize
    );

    let layout = match crossovers {
        Some(freqs) => CrossoverLayout::new(freqs, spec.sample_rate)?,
        None => CrossoverLayout::default_three_band(),
    };
    let config = EngineConfig {
        sample_rate: spec.sample_rate,
        num_channels: spec.channels as usize,
        block_size,
        layout,
        queue_blocks: 8,
    };

    let registry = EffectRegistry::with_builtins();
    let (mut engine, controller) = registry.create("loudness", config)?;

    if let Some(path) = tuning {
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        controller.apply(Parameters::from_json(&json)?)?;
    }
    for assignment in &sets {
        let (name, value) = parse_assignment(assignment)?;
        controller.set(name, &value)?;
    }
    if bypass {
        controller.bypass()?;
    }

    // Stream the file through the queue in blocks, then flush the tail
    let block_samples = block_size * spec.channels as usize;
    let mut processed = Vec::with_capacity(samples.len());
    let mut block = vec![0.0_f32; block_samples];
    for chunk in samples.chunks(block_samples) {
        engine.push_input(chunk)?;
        while let Some(_report) = engine.process_block(&mut block)? {
            processed.extend_from_slice(&block);
        }
    }
    processed.extend(engine.release()?);

    write_samples(output, spec, &processed)?;
    info!(
        "wrote {}: {} frames",
        output,
        processed.len() / spec.channels as usize
    );
    Ok(())
}

/// Read any supported WAV sample format as f32
fn read_samples(reader: &mut hound::WavReader<std::io::BufReader<std::fs::File>>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(CrescendoError::from))
            .collect(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale).map_err(CrescendoError::from))
                .collect()
        }
    }
}

/// Write processed samples as 32-bit float WAV
fn write_samples(path: &str, spec: hound::WavSpec, samples: &[f32]) -> Result<()> {
    let out_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, out_spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Parse `name=value` where value is a number or a boolean
fn parse_assignment(assignment: &str) -> Result<(&str, serde_json::Value)> {
    let (name, raw) = assignment
        .split_once('=')
        .ok_or_else(|| CrescendoError::InvalidParameter {
            param: assignment.to_string(),
            value: assignment.to_string(),
            expected: "NAME=VALUE".to_string(),
        })?;

    let value = if let Ok(b) = raw.parse::<bool>() {
        serde_json::Value::Bool(b)
    } else if let Ok(n) = raw.parse::<f64>() {
        serde_json::json!(n)
    } else {
        return Err(CrescendoError::InvalidParameter {
            param: name.to_string(),
            value: raw.to_string(),
            expected: "a number or boolean".to_string(),
        });
    };
    Ok((name, value))
}
