//! saavy - inspect and audition compiled DSP modules
//!
//! Run with: cargo run -- <command>

mod demo;
mod play;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use saavy_host::cache::{ArtifactBundle, CompileRequest, ModuleCache};
use saavy_host::module::ModuleMetadata;
use saavy_host::EngineConfig;

#[derive(Parser)]
#[command(name = "saavy")]
#[command(about = "Host for compiled DSP modules", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Requested voices, 0 for monophonic (overrides the config file)
    #[arg(short, long, global = true)]
    voices: Option<usize>,

    /// Frames per block (overrides the config file)
    #[arg(short, long, global = true)]
    block_len: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the arena plan and parameter table for a module metadata file
    Inspect {
        /// Metadata JSON emitted by the compiler
        metadata: PathBuf,
    },

    /// Summarize an exported artifact bundle
    Bundle {
        /// Bundle JSON file
        path: PathBuf,
    },

    /// Play an arpeggio on the built-in demo organ
    Play {
        /// Duration in seconds (default: 4.0)
        #[arg(short, long, default_value = "4.0")]
        seconds: f32,

        /// Write the demo organ as a bundle instead of playing it
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn engine_config(cli: &Cli) -> EyreResult<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(voices) = cli.voices {
        config = config.with_voices(voices);
    }
    if let Some(block_len) = cli.block_len {
        config = config.with_block_len(block_len);
    }
    config.validate()?;
    Ok(config)
}

fn inspect(path: &Path, config: &EngineConfig) -> EyreResult<()> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let metadata = ModuleMetadata::parse(&json)?;
    report::print_module(&metadata, None, config)
}

fn bundle(path: &Path, config: &EngineConfig) -> EyreResult<()> {
    let bundle = ArtifactBundle::read_from(path)?;
    let metadata = ModuleMetadata::parse(&bundle.metadata)?;
    let effect = bundle
        .effect
        .as_ref()
        .map(|e| ModuleMetadata::parse(&e.metadata))
        .transpose()?;

    println!("=== {} ===", bundle.name);
    println!("Fingerprint: {}", bundle.fingerprint);
    println!("Binary: {} bytes", bundle.binary.len());
    println!("Source: {} bytes", bundle.source.len());
    match &bundle.effect {
        Some(e) => println!("Effect: {} ({} bytes)", e.fingerprint, e.binary.len()),
        None => println!("Effect: none"),
    }
    println!();

    report::print_module(&metadata, effect.as_ref(), config)
}

fn play(config: EngineConfig, seconds: f32, export: Option<PathBuf>) -> EyreResult<()> {
    let mut cache = ModuleCache::new(demo::BuiltinCompiler, demo::BuiltinLoader);
    let module = cache.get_or_compile(&CompileRequest::new("organ", demo::ORGAN_SOURCE))?;

    if let Some(path) = export {
        if let Some(bundle) = cache.export(module.fingerprint()) {
            bundle.write_to(&path)?;
            println!("Wrote {} to {}", module.name(), path.display());
        }
        return Ok(());
    }

    play::run(Arc::clone(&module), config, seconds)
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = engine_config(&cli)?;

    match cli.command {
        Commands::Inspect { metadata } => inspect(&metadata, &config),
        Commands::Bundle { path } => bundle(&path, &config),
        Commands::Play { seconds, export } => play(config, seconds, export),
    }
}
