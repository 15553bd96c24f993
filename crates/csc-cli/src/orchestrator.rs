//! Job orchestration.

use crate::config::JobConfig;
use crate::data;
use anyhow::{Context, Result};
use lib_csc::{extract_activations, Activation, Dictionary, FitResult, SparseCoder};
use lib_types::signal::Signal;
use lib_types::units::Hertz;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Everything a fit job produces.
#[derive(Debug)]
pub struct FitReport {
    pub name: String,
    pub signal: Signal,
    pub dictionary: Dictionary,
    pub fit: FitResult,
    pub reconstruction: Vec<f64>,
    pub events: Vec<Activation>,
    pub lipschitz: f64,
    pub mse: f64,
    pub elapsed: Duration,
}

/// Fit job orchestrator.
pub struct Orchestrator {
    config: JobConfig,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: JobConfig) -> Self {
        Self { config }
    }

    /// Load inputs and run the job.
    pub fn run(&self) -> Result<FitReport> {
        tracing::info!("Starting job: {}", self.config.name);

        let samples = data::load_signal(&self.config.signal.path)?;
        let mut signal = Signal::from_rate(samples, Hertz(self.config.signal.sample_rate));
        if self.config.signal.remove_mean {
            signal.remove_mean();
        }
        tracing::info!(
            "Loaded signal: {} samples, {:.3} s",
            signal.len(),
            signal.duration().0
        );

        let dictionary = data::load_dictionary(&self.config.dictionary.path, self.config.dictionary.pad_atoms)?;
        tracing::info!("Loaded dictionary: {} atoms of length {}", dictionary.len(), dictionary.atom_len());

        self.run_on(signal, dictionary)
    }

    /// Run the job on already loaded inputs.
    pub fn run_on(&self, signal: Signal, dictionary: Dictionary) -> Result<FitReport> {
        let started = Instant::now();

        let mut coder = SparseCoder::with_config(dictionary, self.config.positive, self.config.solver.clone())
            .context("Failed to build sparse coder")?;
        let lipschitz = coder.lipschitz(signal.len())?;

        let reconstruction = coder
            .fit_signal(&signal, self.config.penalty)
            .context("Fit failed")?
            .predict()?;
        let fit = coder.last_fit().cloned().context("Fit produced no result")?;

        let events = extract_activations(&fit.codes, &self.config.events);
        let mse = signal.mse(&reconstruction).unwrap_or(f64::NAN);
        let elapsed = started.elapsed();

        tracing::info!(
            "Fit {:?} in {} iterations ({:.1} ms): objective {:.6e}, {} events",
            fit.status,
            fit.iterations,
            elapsed.as_secs_f64() * 1e3,
            fit.objective,
            events.len()
        );

        Ok(FitReport {
            name: self.config.name.clone(),
            signal,
            dictionary: coder.dictionary().clone(),
            fit,
            reconstruction,
            events,
            lipschitz,
            mse,
            elapsed,
        })
    }
}

/// One atom placement for signal synthesis, written `atom:offset:amplitude`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub atom: usize,
    pub offset: usize,
    pub amplitude: f64,
}

impl FromStr for Placement {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [atom, offset, amplitude] = parts.as_slice() else {
            anyhow::bail!("expected atom:offset:amplitude, got {:?}", s);
        };
        Ok(Self {
            atom: atom.parse().with_context(|| format!("invalid atom index in {:?}", s))?,
            offset: offset.parse().with_context(|| format!("invalid offset in {:?}", s))?,
            amplitude: amplitude.parse().with_context(|| format!("invalid amplitude in {:?}", s))?,
        })
    }
}

/// Sum placed atoms into a zero signal of `length` samples.
pub fn synthesize(dictionary: &Dictionary, length: usize, placements: &[Placement]) -> Result<Vec<f64>> {
    let code_len = dictionary.code_len(length)?;
    let mut signal = vec![0.0; length];

    for p in placements {
        let atom = dictionary
            .atom(p.atom)
            .with_context(|| format!("atom {} out of range (dictionary has {})", p.atom, dictionary.len()))?;
        if p.offset >= code_len {
            anyhow::bail!(
                "offset {} out of range: atom of length {} must start before {}",
                p.offset,
                dictionary.atom_len(),
                code_len
            );
        }
        for (j, &d) in atom.iter().enumerate() {
            signal[p.offset + j] += p.amplitude * d;
        }
    }

    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn scenario_dictionary() -> Dictionary {
        Dictionary::new(vec![vec![0.0, 1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0, 0.0]]).unwrap()
    }

    #[test]
    fn test_placement_parse() {
        let p: Placement = "1:12:0.5".parse().unwrap();
        assert_eq!(p, Placement { atom: 1, offset: 12, amplitude: 0.5 });
        assert!("1:12".parse::<Placement>().is_err());
        assert!("a:1:1".parse::<Placement>().is_err());
        assert!("0:-3:1".parse::<Placement>().is_err());
    }

    #[test]
    fn test_synthesize_scenario() {
        let placements = ["0:3:1".parse().unwrap(), "1:12:1".parse().unwrap()];
        let signal = synthesize(&scenario_dictionary(), 20, &placements).unwrap();

        let mut expected = vec![0.0; 20];
        for i in [4, 5, 6, 14] {
            expected[i] = 1.0;
        }
        assert_eq!(signal, expected);
    }

    #[test]
    fn test_synthesize_bounds() {
        let dict = scenario_dictionary();
        let out_of_range = Placement { atom: 0, offset: 16, amplitude: 1.0 };
        assert!(synthesize(&dict, 20, &[out_of_range]).is_err());

        let bad_atom = Placement { atom: 2, offset: 0, amplitude: 1.0 };
        assert!(synthesize(&dict, 20, &[bad_atom]).is_err());

        assert!(synthesize(&dict, 3, &[]).is_err());
    }

    #[test]
    fn test_run_on_scenario() {
        let config = parse_config(
            r#"
            penalty = 0.01
            [signal]
            path = "unused.csv"
            sample_rate = 100.0
            [dictionary]
            path = "unused.csv"
            [solver]
            tolerance = 1e-10
            max_iterations = 20000
            [events]
            threshold = 0.5
            min_separation = 3
            "#,
            false,
        )
        .unwrap();

        let dict = scenario_dictionary();
        let placements = [Placement { atom: 0, offset: 3, amplitude: 1.0 }, Placement { atom: 1, offset: 12, amplitude: 1.0 }];
        let samples = synthesize(&dict, 20, &placements).unwrap();
        let signal = Signal::from_rate(samples, Hertz(100.0));

        let report = Orchestrator::new(config).run_on(signal, dict).unwrap();

        assert!(report.mse < 1e-3);
        assert_eq!(report.reconstruction.len(), 20);
        assert_eq!(report.fit.codes.shape(), (2, 16));
        let found: Vec<(usize, usize)> = report.events.iter().map(|e| (e.atom, e.offset)).collect();
        assert_eq!(found, vec![(0, 3), (1, 12)]);
        assert!((report.events[1].time(&report.signal).0 - 0.12).abs() < 1e-12);
    }
}
