//! Convolutional sparse coder.
//!
//! [`SparseCoder`] owns an immutable dictionary, a positivity flag and a
//! solver configuration, plus one replaceable slot holding the last
//! successful [`FitResult`]. Two styles of use are supported:
//!
//! ```no_run
//! use lib_csc::{Dictionary, SparseCoder};
//!
//! # fn main() -> Result<(), lib_csc::CscError> {
//! let dict = Dictionary::new(vec![vec![0.0, 1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0, 0.0]])?;
//! let mut coder = SparseCoder::new(dict, true)?;
//! let signal = vec![0.0; 20];
//!
//! // Stateful: fit, then predict from the cached codes
//! let reconstruction = coder.fit(&signal, 0.01)?.predict()?;
//!
//! // Stateless: get a result object back, the cache is untouched
//! let result = coder.solve(&signal, 0.01)?;
//! let same = result.reconstruct(coder.dictionary())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! `fit` takes `&mut self`, so the cache cannot be raced. `solve`,
//! `predict` and `fit_channels` take `&self`; the coder is `Send + Sync`
//! and may be shared across threads for those.

use crate::codes::Codes;
use crate::dictionary::Dictionary;
use crate::error::{CscError, CscResult};
use crate::lipschitz;
use crate::operator::{self, ConvOperator};
use crate::solver::{IterationState, Solver, SolverConfig, SolverOutput, SolverStatus};
use lib_types::signal::Signal;
use rayon::prelude::*;
use std::ops::ControlFlow;

/// Outcome of coding one signal.
#[derive(Clone, Debug)]
pub struct FitResult {
    /// Converged activation codes, `K × (T − L + 1)`.
    pub codes: Codes,

    /// Penalty weight the codes were fitted with.
    pub penalty: f64,

    /// Whether codes were constrained to be non-negative.
    pub positive: bool,

    /// Length of the coded signal.
    pub signal_len: usize,

    /// Terminal solver state.
    pub status: SolverStatus,

    /// Iterations performed.
    pub iterations: usize,

    /// Final objective value.
    pub objective: f64,

    /// Objective at the start and after each iteration.
    pub objective_history: Vec<f64>,

    /// `‖s − D z‖₂` at the returned codes.
    pub residual_norm: f64,

    /// Gradient step `1 / L`.
    pub step_size: f64,
}

impl FitResult {
    fn from_output(out: SolverOutput, penalty: f64, positive: bool, signal_len: usize) -> Self {
        Self {
            codes: out.codes,
            penalty,
            positive,
            signal_len,
            status: out.status,
            iterations: out.iterations,
            objective: out.objective,
            objective_history: out.objective_history,
            residual_norm: out.residual_norm,
            step_size: out.step_size,
        }
    }

    /// Forward model of these codes against `dictionary`.
    pub fn reconstruct(&self, dictionary: &Dictionary) -> CscResult<Vec<f64>> {
        operator::reconstruct(dictionary, &self.codes)
    }

    /// Whether the solver met its tolerance.
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// Sparse coder over a fixed dictionary.
#[derive(Debug)]
pub struct SparseCoder {
    op: ConvOperator,
    positive: bool,
    config: SolverConfig,
    /// Cached when the step size does not depend on signal length.
    lipschitz: Option<f64>,
    last: Option<FitResult>,
}

impl SparseCoder {
    /// Create a coder with the default solver configuration.
    pub fn new(dictionary: Dictionary, positive: bool) -> CscResult<Self> {
        Self::with_config(dictionary, positive, SolverConfig::default())
    }

    /// Create a coder from raw atoms, validating them first.
    pub fn from_atoms(atoms: Vec<Vec<f64>>, positive: bool) -> CscResult<Self> {
        Self::new(Dictionary::new(atoms)?, positive)
    }

    /// Create a coder with an explicit solver configuration.
    pub fn with_config(dictionary: Dictionary, positive: bool, config: SolverConfig) -> CscResult<Self> {
        config.validate()?;
        if dictionary.is_all_zero() {
            return Err(CscError::DegenerateDictionary);
        }

        let op = ConvOperator::new(dictionary, config.convolution)?;
        let lipschitz = if config.lipschitz.depends_on_length() {
            None
        } else {
            Some(lipschitz::estimate(&op, config.lipschitz, op.dictionary().atom_len())?)
        };

        Ok(Self {
            op,
            positive,
            config,
            lipschitz,
            last: None,
        })
    }

    /// The dictionary, read-only.
    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        self.op.dictionary()
    }

    /// Whether codes are constrained to be non-negative.
    #[inline]
    pub fn positive(&self) -> bool {
        self.positive
    }

    /// Active solver configuration.
    #[inline]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The convolution operator used by the solver.
    #[inline]
    pub fn operator(&self) -> &ConvOperator {
        &self.op
    }

    /// Lipschitz constant used for a signal of `signal_len` samples.
    pub fn lipschitz(&self, signal_len: usize) -> CscResult<f64> {
        match self.lipschitz {
            Some(value) => Ok(value),
            None => lipschitz::estimate(&self.op, self.config.lipschitz, signal_len),
        }
    }

    /// Code `signal` without touching the cached result.
    pub fn solve(&self, signal: &[f64], penalty: f64) -> CscResult<FitResult> {
        self.solve_from(signal, penalty, None)
    }

    /// Code `signal` starting from `init` (zeros when `None`).
    pub fn solve_from(&self, signal: &[f64], penalty: f64, init: Option<Codes>) -> CscResult<FitResult> {
        self.solve_observed(signal, penalty, init, |_| ControlFlow::Continue(()))
    }

    /// Code `signal`, calling `observer` after every iteration.
    ///
    /// The observer may return `ControlFlow::Break` to stop early; the
    /// result then carries [`SolverStatus::Interrupted`].
    pub fn solve_observed<F>(&self, signal: &[f64], penalty: f64, init: Option<Codes>, observer: F) -> CscResult<FitResult>
    where
        F: FnMut(&IterationState<'_>) -> ControlFlow<()>,
    {
        self.validate_input(signal, penalty)?;
        let lipschitz = self.lipschitz(signal.len())?;

        let solver = Solver::new(&self.op, &self.config, lipschitz);
        let out = solver.run_with_observer(signal, penalty, self.positive, init, observer)?;

        tracing::debug!(
            signal_len = signal.len(),
            penalty,
            iterations = out.iterations,
            objective = out.objective,
            nonzero = out.codes.count_nonzero(0.0),
            "Signal coded"
        );

        Ok(FitResult::from_output(out, penalty, self.positive, signal.len()))
    }

    /// Fit `signal` and cache the result.
    ///
    /// With `warm_start` configured, a previous result of matching shape is
    /// used as the starting point. A failed fit clears the cache.
    pub fn fit(&mut self, signal: &[f64], penalty: f64) -> CscResult<&mut Self> {
        let init = if self.config.warm_start {
            let shape = (self.dictionary().len(), signal.len().saturating_sub(self.dictionary().atom_len()) + 1);
            self.last
                .as_ref()
                .filter(|r| r.codes.shape() == shape && r.signal_len == signal.len())
                .map(|r| r.codes.clone())
        } else {
            None
        };
        self.store(signal, penalty, init)
    }

    /// Fit `signal` starting from explicit codes and cache the result.
    pub fn fit_from(&mut self, signal: &[f64], penalty: f64, init: Codes) -> CscResult<&mut Self> {
        self.store(signal, penalty, Some(init))
    }

    /// Fit a [`Signal`]'s samples.
    pub fn fit_signal(&mut self, signal: &Signal, penalty: f64) -> CscResult<&mut Self> {
        self.fit(&signal.samples, penalty)
    }

    fn store(&mut self, signal: &[f64], penalty: f64, init: Option<Codes>) -> CscResult<&mut Self> {
        self.last = None;
        let result = self.solve_from(signal, penalty, init)?;
        self.last = Some(result);
        Ok(self)
    }

    /// Code several channels independently, in parallel.
    ///
    /// Results are returned in channel order. The cache is untouched.
    pub fn fit_channels(&self, channels: &[Vec<f64>], penalty: f64) -> CscResult<Vec<FitResult>> {
        channels
            .par_iter()
            .map(|channel| self.solve(channel, penalty))
            .collect()
    }

    /// Reconstruction from the cached codes.
    pub fn predict(&self) -> CscResult<Vec<f64>> {
        let last = self.last.as_ref().ok_or(CscError::NotFitted)?;
        self.op.forward(&last.codes)
    }

    /// Cached codes from the last successful fit.
    pub fn codes(&self) -> CscResult<&Codes> {
        self.last.as_ref().map(|r| &r.codes).ok_or(CscError::NotFitted)
    }

    /// Full result of the last successful fit.
    pub fn last_fit(&self) -> Option<&FitResult> {
        self.last.as_ref()
    }

    fn validate_input(&self, signal: &[f64], penalty: f64) -> CscResult<()> {
        if !(penalty.is_finite() && penalty > 0.0) {
            return Err(CscError::InvalidPenalty(penalty));
        }
        self.dictionary().code_len(signal.len())?;
        if let Some(index) = signal.iter().position(|v| !v.is_finite()) {
            return Err(CscError::NonFiniteInput { index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lipschitz::LipschitzMethod;
    use crate::operator::ConvolutionMethod;
    use lib_types::signal::mean_squared_error;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scenario_dictionary() -> Dictionary {
        Dictionary::new(vec![vec![0.0, 1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0, 0.0]]).unwrap()
    }

    /// Atom 1 at offset 3 and atom 2 at offset 12 in a 20-sample signal.
    fn scenario_signal() -> Vec<f64> {
        let mut signal = vec![0.0; 20];
        signal[4] = 1.0;
        signal[5] = 1.0;
        signal[6] = 1.0;
        signal[14] = 1.0;
        signal
    }

    fn tight_config() -> SolverConfig {
        SolverConfig {
            tolerance: 1e-10,
            max_iterations: 20_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_recovers_placed_atoms() {
        let mut coder = SparseCoder::with_config(scenario_dictionary(), true, tight_config()).unwrap();
        let signal = scenario_signal();
        let reconstruction = coder.fit(&signal, 0.01).unwrap().predict().unwrap();

        let codes = coder.codes().unwrap();
        assert_eq!(codes.shape(), (2, 16));

        let (offset_1, amp_1) = codes.dominant(0).unwrap();
        let (offset_2, amp_2) = codes.dominant(1).unwrap();
        assert!((offset_1 as i64 - 3).abs() <= 1, "atom 1 dominant at {}", offset_1);
        assert!((offset_2 as i64 - 12).abs() <= 1, "atom 2 dominant at {}", offset_2);
        assert!(amp_1 > 0.9 && amp_2 > 0.9);

        let mse = mean_squared_error(&signal, &reconstruction).unwrap();
        assert!(mse < 1e-3, "mse {}", mse);
    }

    #[test]
    fn test_over_penalized_is_all_zero() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        let reconstruction = coder.fit(&scenario_signal(), 1000.0).unwrap().predict().unwrap();

        assert!(coder.codes().unwrap().is_zero());
        assert_eq!(reconstruction.len(), 20);
        assert!(reconstruction.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sparsity_monotone_in_penalty() {
        // Isolated placements of one atom; amplitude a survives while λ < 6a
        let atom = vec![1.0, 2.0, 1.0];
        let mut signal = vec![0.0; 40];
        for (offset, amp) in [(5usize, 4.0), (15, 2.0), (25, 1.0), (33, 0.5)] {
            for (j, &d) in atom.iter().enumerate() {
                signal[offset + j] += amp * d;
            }
        }
        let coder = SparseCoder::with_config(Dictionary::new(vec![atom]).unwrap(), true, tight_config()).unwrap();

        let counts: Vec<usize> = [0.1, 4.0, 8.0, 15.0, 30.0]
            .iter()
            .map(|&penalty| coder.solve(&signal, penalty).unwrap().codes.count_nonzero(1e-8))
            .collect();

        for pair in counts.windows(2) {
            assert!(pair[1] <= pair[0], "counts not monotone: {:?}", counts);
        }
        assert_eq!(counts.first(), Some(&4));
        assert_eq!(counts.last(), Some(&0));
    }

    #[test]
    fn test_positivity_invariant() {
        let mut rng = StdRng::seed_from_u64(3);
        let coder = SparseCoder::new(
            Dictionary::new(vec![vec![1.0, -0.5, 0.25, 0.0], vec![0.3, 0.6, -0.9, 0.2]]).unwrap(),
            true,
        )
        .unwrap();

        for penalty in [0.001, 0.05, 0.5] {
            let signal: Vec<f64> = (0..64).map(|_| rng.gen_range(-2.0..2.0)).collect();
            let result = coder.solve(&signal, penalty).unwrap();
            assert!(result.codes.min_value().unwrap() >= 0.0);
        }
    }

    #[test]
    fn test_two_sided_codes_can_be_negative() {
        let coder = SparseCoder::new(scenario_dictionary(), false).unwrap();
        let signal: Vec<f64> = scenario_signal().iter().map(|v| -v).collect();
        let result = coder.solve(&signal, 0.01).unwrap();
        assert!(result.codes.min_value().unwrap() < -0.5);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        coder.fit(&scenario_signal(), 0.01).unwrap();

        let a = coder.predict().unwrap();
        let b = coder.predict().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let signal = scenario_signal();
        let mut first = SparseCoder::new(scenario_dictionary(), true).unwrap();
        let mut second = SparseCoder::new(scenario_dictionary(), true).unwrap();
        first.fit(&signal, 0.02).unwrap();
        second.fit(&signal, 0.02).unwrap();

        assert_eq!(first.codes().unwrap(), second.codes().unwrap());
        assert_eq!(
            first.last_fit().unwrap().objective_history,
            second.last_fit().unwrap().objective_history
        );
    }

    #[test]
    fn test_solve_matches_fit_and_reconstruct_matches_predict() {
        let signal = scenario_signal();
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();

        let result = coder.solve(&signal, 0.01).unwrap();
        assert!(coder.last_fit().is_none());

        coder.fit(&signal, 0.01).unwrap();
        assert_eq!(&result.codes, coder.codes().unwrap());
        assert_eq!(result.reconstruct(coder.dictionary()).unwrap(), coder.predict().unwrap());
    }

    #[test]
    fn test_refit_replaces_cache() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        coder.fit(&scenario_signal(), 0.01).unwrap();
        assert!(!coder.codes().unwrap().is_zero());

        coder.fit(&vec![0.0; 30], 0.01).unwrap();
        assert_eq!(coder.codes().unwrap().shape(), (2, 26));
        assert!(coder.codes().unwrap().is_zero());
        assert_eq!(coder.last_fit().unwrap().signal_len, 30);
    }

    #[test]
    fn test_warm_start_needs_fewer_iterations() {
        let signal = scenario_signal();
        let config = SolverConfig {
            warm_start: true,
            ..tight_config()
        };
        let mut coder = SparseCoder::with_config(scenario_dictionary(), true, config).unwrap();

        coder.fit(&signal, 0.01).unwrap();
        let cold = coder.last_fit().unwrap().iterations;
        coder.fit(&signal, 0.01).unwrap();
        let warm = coder.last_fit().unwrap().iterations;

        assert!(warm < cold, "warm {} vs cold {}", warm, cold);
    }

    #[test]
    fn test_fit_from_explicit_codes() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        let bad = coder.fit_from(&scenario_signal(), 0.01, Codes::zeros(2, 5));
        assert!(matches!(bad, Err(CscError::ShapeMismatch { .. })));
        assert!(matches!(coder.predict(), Err(CscError::NotFitted)));

        coder.fit_from(&scenario_signal(), 0.01, Codes::zeros(2, 16)).unwrap();
        assert!(coder.codes().is_ok());
    }

    #[test]
    fn test_not_fitted() {
        let coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        assert!(matches!(coder.predict(), Err(CscError::NotFitted)));
        assert!(matches!(coder.codes(), Err(CscError::NotFitted)));
        assert!(coder.last_fit().is_none());
    }

    #[test]
    fn test_input_validation() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();

        assert!(matches!(
            coder.fit(&[0.0; 4], 0.01),
            Err(CscError::InvalidInputLength { signal_len: 4, atom_len: 5 })
        ));
        assert!(matches!(coder.fit(&[0.0; 10], 0.0), Err(CscError::InvalidPenalty(_))));
        assert!(matches!(coder.fit(&[0.0; 10], -1.0), Err(CscError::InvalidPenalty(_))));
        assert!(matches!(coder.fit(&[0.0; 10], f64::NAN), Err(CscError::InvalidPenalty(_))));

        let mut signal = vec![0.0; 10];
        signal[7] = f64::INFINITY;
        assert!(matches!(coder.fit(&signal, 0.01), Err(CscError::NonFiniteInput { index: 7 })));
    }

    #[test]
    fn test_failed_fit_clears_cache() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        coder.fit(&scenario_signal(), 0.01).unwrap();
        assert!(coder.fit(&[0.0; 3], 0.01).is_err());
        assert!(matches!(coder.predict(), Err(CscError::NotFitted)));
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(SparseCoder::from_atoms(vec![], true), Err(CscError::InvalidDictionary(_))));
        assert!(matches!(
            SparseCoder::from_atoms(vec![vec![1.0, 0.0], vec![1.0]], true),
            Err(CscError::InvalidDictionary(_))
        ));
        assert!(matches!(
            SparseCoder::from_atoms(vec![vec![0.0; 5]], true),
            Err(CscError::DegenerateDictionary)
        ));
        let bad_config = SolverConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            SparseCoder::with_config(scenario_dictionary(), true, bad_config),
            Err(CscError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_lipschitz_methods_agree_on_solution() {
        let signal = scenario_signal();
        let objectives: Vec<f64> = [
            LipschitzMethod::AtomEnergy,
            LipschitzMethod::Spectral,
            LipschitzMethod::PowerIteration { iterations: 100 },
        ]
        .into_iter()
        .map(|lipschitz| {
            let config = SolverConfig {
                lipschitz,
                ..tight_config()
            };
            let coder = SparseCoder::with_config(scenario_dictionary(), true, config).unwrap();
            coder.solve(&signal, 0.01).unwrap().objective
        })
        .collect();

        for pair in objectives.windows(2) {
            assert!((pair[0] - pair[1]).abs() < 1e-5, "{:?}", objectives);
        }
    }

    #[test]
    fn test_overlap_save_coder_matches_direct() {
        let mut rng = StdRng::seed_from_u64(21);
        let atom: Vec<f64> = (0..64).map(|i| (-(i as f64) / 12.0).exp() * (i as f64 / 4.0).sin()).collect();
        let mut signal = vec![0.0; 600];
        for (offset, amp) in [(40usize, 1.0), (250, 1.6), (470, 0.7)] {
            for (j, &d) in atom.iter().enumerate() {
                signal[offset + j] += amp * d;
            }
        }
        for s in signal.iter_mut() {
            *s += rng.gen_range(-0.01..0.01);
        }

        let solve_with = |convolution| {
            let config = SolverConfig {
                convolution,
                max_iterations: 300,
                tolerance: 0.0,
                ..Default::default()
            };
            SparseCoder::with_config(Dictionary::new(vec![atom.clone()]).unwrap(), true, config)
                .unwrap()
                .solve(&signal, 0.05)
                .unwrap()
        };

        let direct = solve_with(ConvolutionMethod::Direct);
        let fft = solve_with(ConvolutionMethod::OverlapSave);
        assert!((direct.objective - fft.objective).abs() < 1e-6 * (1.0 + direct.objective));
        assert_eq!(direct.codes.dominant(0).map(|d| d.0), fft.codes.dominant(0).map(|d| d.0));
    }

    #[test]
    fn test_fit_channels() {
        let coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        let first = scenario_signal();
        let second: Vec<f64> = first.iter().map(|v| v * 2.0).collect();

        let results = coder.fit_channels(&[first.clone(), second.clone()], 0.01).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].codes, coder.solve(&first, 0.01).unwrap().codes);
        assert_eq!(results[1].codes, coder.solve(&second, 0.01).unwrap().codes);

        let err = coder.fit_channels(&[first, vec![0.0; 2]], 0.01);
        assert!(matches!(err, Err(CscError::InvalidInputLength { .. })));
    }

    #[test]
    fn test_fit_signal() {
        let mut coder = SparseCoder::new(scenario_dictionary(), true).unwrap();
        let signal = Signal::from_rate(scenario_signal(), lib_types::units::Hertz(100.0));
        coder.fit_signal(&signal, 0.01).unwrap();
        assert_eq!(coder.last_fit().unwrap().signal_len, 20);
    }

    #[test]
    fn test_events_recover_placements() {
        use crate::events::{extract_activations, EventConfig};

        let mut coder = SparseCoder::with_config(scenario_dictionary(), true, tight_config()).unwrap();
        coder.fit(&scenario_signal(), 0.01).unwrap();
        let config = EventConfig {
            threshold: 0.5,
            min_separation: 3,
        };
        let events = extract_activations(coder.codes().unwrap(), &config);

        let placements: Vec<(usize, usize)> = events.iter().map(|e| (e.atom, e.offset)).collect();
        assert_eq!(placements, vec![(0, 3), (1, 12)]);
    }

    #[test]
    fn test_coder_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SparseCoder>();
    }
}
