//! csc: convolutional sparse coding from the command line.
//!
//! Fits activation codes for a signal against a fixed dictionary, inspects
//! dictionaries, and synthesizes test signals from atom placements.

mod config;
mod data;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_csc::lipschitz::{atom_energy_bound, power_iteration, spectral_estimate};
use lib_csc::{ConvOperator, ConvolutionMethod};
use orchestrator::Placement;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "csc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit sparse codes for a signal
    Fit {
        /// Path to the job configuration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Print atom statistics and step-size estimates for a dictionary
    Inspect {
        /// Path to the dictionary CSV (one atom per row)
        dictionary: PathBuf,

        /// Signal length used for the power-iteration estimate
        #[arg(short, long, default_value = "1024")]
        length: usize,

        /// Zero-pad atoms of differing length
        #[arg(long)]
        pad_atoms: bool,
    },

    /// Build a signal by placing dictionary atoms
    Synthesize {
        /// Path to the dictionary CSV
        #[arg(short, long)]
        dictionary: PathBuf,

        /// Signal length in samples
        #[arg(short, long)]
        length: usize,

        /// Placement as atom:offset:amplitude (repeatable)
        #[arg(short, long = "place")]
        placements: Vec<Placement>,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Fit { config, output } => {
            run_fit(&config, &output, cli.format)?;
        }
        Commands::Inspect { dictionary, length, pad_atoms } => {
            inspect(&dictionary, length, pad_atoms, cli.format)?;
        }
        Commands::Synthesize { dictionary, length, placements, output } => {
            synthesize(&dictionary, length, &placements, output)?;
        }
    }

    Ok(())
}

fn run_fit(config_path: &Path, output_dir: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let select = config.output.clone();
    let orchestrator = orchestrator::Orchestrator::new(config);

    let report = orchestrator.run()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
    output::write_results(&report, output_dir, format, &select)?;
    output::print_results(&report);

    tracing::info!("Job complete. Results written to {:?}", output_dir);
    Ok(())
}

fn inspect(path: &Path, length: usize, pad_atoms: bool, format: OutputFormat) -> Result<()> {
    tracing::info!("Inspecting dictionary: {:?}", path);

    let dictionary = data::load_dictionary(path, pad_atoms)?;
    let energy_bound = atom_energy_bound(&dictionary);
    let spectral = spectral_estimate(&dictionary)?;
    let op = ConvOperator::new(dictionary.clone(), ConvolutionMethod::Auto)?;
    let power = power_iteration(&op, length, 100)?;

    match format {
        OutputFormat::Text => {
            println!("Dictionary: {:?}", path);
            println!("  Atoms:       {}", dictionary.len());
            println!("  Atom length: {}", dictionary.atom_len());
            for (k, atom) in dictionary.atoms().iter().enumerate() {
                println!("    atom {:3}: energy {:.6}, L1 {:.6}", k, atom.energy(), atom.l1_norm());
            }
            println!("\nLipschitz estimates:");
            println!("  Atom energy bound:       {:.6}", energy_bound);
            println!("  Spectral peak:           {:.6}", spectral);
            println!("  Power iteration (T={}): {:.6}", length, power);
        }
        OutputFormat::Json => {
            let atoms: Vec<_> = dictionary
                .atoms()
                .iter()
                .map(|a| serde_json::json!({ "energy": a.energy(), "l1_norm": a.l1_norm() }))
                .collect();
            let json = serde_json::json!({
                "num_atoms": dictionary.len(),
                "atom_len": dictionary.atom_len(),
                "atoms": atoms,
                "lipschitz": {
                    "atom_energy": energy_bound,
                    "spectral": spectral,
                    "power_iteration": power,
                    "signal_len": length,
                },
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Csv => {
            println!("atom,energy,l1_norm");
            for (k, atom) in dictionary.atoms().iter().enumerate() {
                println!("{},{},{}", k, atom.energy(), atom.l1_norm());
            }
        }
    }

    Ok(())
}

fn synthesize(dictionary_path: &Path, length: usize, placements: &[Placement], output: Option<PathBuf>) -> Result<()> {
    let dictionary = data::load_dictionary(dictionary_path, false)?;
    let signal = orchestrator::synthesize(&dictionary, length, placements)?;
    tracing::info!("Synthesized {} samples from {} placements", signal.len(), placements.len());

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    writeln!(writer, "index,value")?;
    for (i, v) in signal.iter().enumerate() {
        writeln!(writer, "{},{}", i, v)?;
    }
    writer.flush()?;

    if let Some(path) = output {
        println!("Written to: {:?}", path);
    }
    Ok(())
}
