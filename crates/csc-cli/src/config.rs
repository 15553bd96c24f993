//! Job configuration loading and validation.

use anyhow::{Context, Result};
use lib_csc::{EventConfig, SolverConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level fit job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name, echoed in the summary.
    #[serde(default = "default_name")]
    pub name: String,

    /// Input signal.
    pub signal: SignalConfig,

    /// Atom dictionary.
    pub dictionary: DictionaryConfig,

    /// Sparsity weight λ.
    pub penalty: f64,

    /// Constrain codes to be non-negative.
    #[serde(default = "default_true")]
    pub positive: bool,

    /// Solver parameters.
    #[serde(default)]
    pub solver: SolverConfig,

    /// Event extraction parameters.
    #[serde(default)]
    pub events: EventConfig,

    /// Which files to write.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Signal source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalConfig {
    /// CSV file with one sample per row.
    pub path: PathBuf,

    /// Sample rate in Hz, used to report event times.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Subtract the mean before coding.
    #[serde(default)]
    pub remove_mean: bool,
}

/// Dictionary source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DictionaryConfig {
    /// CSV file with one atom per row.
    pub path: PathBuf,

    /// Zero-pad shorter atoms instead of rejecting the file.
    #[serde(default)]
    pub pad_atoms: bool,
}

/// Output selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub codes: bool,

    #[serde(default = "default_true")]
    pub reconstruction: bool,

    #[serde(default = "default_true")]
    pub events: bool,

    #[serde(default = "default_true")]
    pub objective: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codes: true,
            reconstruction: true,
            events: true,
            objective: true,
        }
    }
}

fn default_name() -> String { "csc".to_string() }
fn default_true() -> bool { true }
fn default_sample_rate() -> f64 { 1.0 }

/// Load a job from a TOML or JSON file.
///
/// Relative data paths are resolved against the job file's directory.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let is_json = path.extension().map_or(false, |e| e == "json");
    let mut config = parse_config(&content, is_json)?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }

    validate_config(&config)?;
    check_files(&config)?;

    Ok(config)
}

/// Parse a job from text.
pub fn parse_config(content: &str, is_json: bool) -> Result<JobConfig> {
    if is_json {
        serde_json::from_str(content).with_context(|| "Failed to parse config as JSON")
    } else {
        toml::from_str(content).with_context(|| "Failed to parse config as TOML")
    }
}

impl JobConfig {
    fn resolve_paths(&mut self, base: &Path) {
        if self.signal.path.is_relative() {
            self.signal.path = base.join(&self.signal.path);
        }
        if self.dictionary.path.is_relative() {
            self.dictionary.path = base.join(&self.dictionary.path);
        }
    }
}

/// Check value ranges that serde cannot express.
pub fn validate_config(config: &JobConfig) -> Result<()> {
    if !(config.penalty.is_finite() && config.penalty > 0.0) {
        anyhow::bail!("penalty must be positive and finite (got {})", config.penalty);
    }

    if !(config.signal.sample_rate.is_finite() && config.signal.sample_rate > 0.0) {
        anyhow::bail!("signal.sample_rate must be positive (got {})", config.signal.sample_rate);
    }

    if !(config.events.threshold.is_finite() && config.events.threshold >= 0.0) {
        anyhow::bail!("events.threshold must be non-negative (got {})", config.events.threshold);
    }

    config.solver.validate().context("Invalid solver configuration")?;

    Ok(())
}

fn check_files(config: &JobConfig) -> Result<()> {
    if !config.signal.path.exists() {
        anyhow::bail!("Signal file not found: {:?}", config.signal.path);
    }
    if !config.dictionary.path.exists() {
        anyhow::bail!("Dictionary file not found: {:?}", config.dictionary.path);
    }
    Ok(())
}
