//! Accelerated proximal-gradient (FISTA) solver.
//!
//! Minimizes
//!
//! ```text
//! F(z) = ½‖s − D z‖² + λ‖z‖₁        (z ≥ 0 in positive mode)
//! ```
//!
//! where `D` is the dictionary convolution operator. Each iteration takes a
//! gradient step of size `1/L` from the extrapolated point `y`, applies the
//! L1 shrinkage, and updates the Nesterov momentum:
//!
//! ```text
//! u      = prox(y + Dᵀ(s − D y) / L, λ / L)
//! t'     = (1 + √(1 + 4t²)) / 2
//! z'     = u
//! y'     = z' + ((t − 1) / t')(z' − z)
//! ```
//!
//! With `monotone` enabled (the default) a candidate that increases the
//! objective is rejected (`z' = z`) and the extrapolation becomes
//! `y' = z' + (t/t')(u − z')` (Beck & Teboulle's MFISTA). Accepted steps are
//! identical to plain FISTA.
//!
//! The loop is sequential and deterministic: identical inputs and
//! configuration produce bit-identical codes.

use crate::codes::Codes;
use crate::error::{CscError, CscResult};
use crate::lipschitz::LipschitzMethod;
use crate::operator::{ConvOperator, ConvolutionMethod};
use crate::prox::prox_inplace;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Quantity compared against the tolerance to declare convergence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingCriterion {
    /// Relative change of the objective value.
    #[default]
    Objective,
    /// Relative change of the code tensor (Euclidean norm).
    Iterate,
}

/// Solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence tolerance on the relative change.
    pub tolerance: f64,

    /// Iteration cap.
    pub max_iterations: usize,

    /// What the tolerance applies to.
    pub stopping: StoppingCriterion,

    /// Step-size estimator.
    pub lipschitz: LipschitzMethod,

    /// Convolution evaluation strategy.
    pub convolution: ConvolutionMethod,

    /// Reject steps that increase the objective.
    pub monotone: bool,

    /// Start from the previous fit's codes when shapes match.
    pub warm_start: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 1000,
            stopping: StoppingCriterion::default(),
            lipschitz: LipschitzMethod::default(),
            convolution: ConvolutionMethod::default(),
            monotone: true,
            warm_start: false,
        }
    }
}

impl SolverConfig {
    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> CscResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(CscError::InvalidConfig(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(CscError::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if let LipschitzMethod::PowerIteration { iterations: 0 } = self.lipschitz {
            return Err(CscError::InvalidConfig("power iteration needs at least one iteration".into()));
        }
        Ok(())
    }
}

/// Terminal state of a solver run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    /// Relative change fell below the tolerance.
    Converged,
    /// Iteration cap reached first.
    MaxIterationsReached,
    /// Stopped by the caller's observer.
    Interrupted,
}

/// Snapshot handed to an observer after each iteration.
#[derive(Debug)]
pub struct IterationState<'a> {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Objective at the current iterate.
    pub objective: f64,
    /// Current iterate.
    pub codes: &'a Codes,
}

/// Everything a solver run produces.
#[derive(Clone, Debug)]
pub struct SolverOutput {
    pub codes: Codes,
    pub status: SolverStatus,
    pub iterations: usize,
    pub objective: f64,
    /// Objective at the starting point followed by one entry per iteration.
    pub objective_history: Vec<f64>,
    pub residual_norm: f64,
    pub step_size: f64,
}

/// FISTA over a fixed convolution operator.
pub struct Solver<'a> {
    op: &'a ConvOperator,
    config: &'a SolverConfig,
    lipschitz: f64,
}

impl<'a> Solver<'a> {
    /// Create a solver stepping by `1 / lipschitz`.
    pub fn new(op: &'a ConvOperator, config: &'a SolverConfig, lipschitz: f64) -> Self {
        Self { op, config, lipschitz }
    }

    /// Run to convergence or the iteration cap.
    pub fn run(&self, signal: &[f64], penalty: f64, positive: bool, init: Option<Codes>) -> CscResult<SolverOutput> {
        self.run_with_observer(signal, penalty, positive, init, |_| ControlFlow::Continue(()))
    }

    /// Run, calling `observer` after every iteration.
    ///
    /// Returning `ControlFlow::Break` stops the loop with
    /// [`SolverStatus::Interrupted`] and the current iterate.
    pub fn run_with_observer<F>(
        &self,
        signal: &[f64],
        penalty: f64,
        positive: bool,
        init: Option<Codes>,
        mut observer: F,
    ) -> CscResult<SolverOutput>
    where
        F: FnMut(&IterationState<'_>) -> ControlFlow<()>,
    {
        if !(self.lipschitz.is_finite() && self.lipschitz > 0.0) {
            return Err(CscError::DegenerateDictionary);
        }
        let dictionary = self.op.dictionary();
        let shape = (dictionary.len(), dictionary.code_len(signal.len())?);

        let mut z = match init {
            Some(codes) if codes.shape() != shape => {
                return Err(CscError::ShapeMismatch {
                    expected: shape,
                    actual: codes.shape(),
                })
            }
            Some(codes) => codes,
            None => Codes::zeros(shape.0, shape.1),
        };
        if positive {
            // Project a warm start onto the feasible set
            prox_inplace(&mut z, 0.0, true);
        }

        let step = 1.0 / self.lipschitz;
        let threshold = step * penalty;

        let mut recon_z = self.op.forward(&z)?;
        let mut f_z = objective_from(signal, &recon_z, &z, penalty);
        if !f_z.is_finite() {
            return Err(CscError::NumericalDivergence { iteration: 0 });
        }

        let mut y = z.clone();
        let mut recon_y = recon_z.clone();
        let mut t = 1.0_f64;

        let mut history = Vec::with_capacity(self.config.max_iterations.min(4096) + 1);
        history.push(f_z);

        let mut status = SolverStatus::MaxIterationsReached;
        let mut iterations = 0;

        tracing::debug!(
            step,
            threshold,
            atoms = shape.0,
            code_len = shape.1,
            initial_objective = f_z,
            "Starting FISTA"
        );

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;

            // Gradient step from y: -∇f(y) = Dᵀ(s − D y)
            let residual: Vec<f64> = signal.iter().zip(&recon_y).map(|(s, r)| s - r).collect();
            let gradient = self.op.adjoint(&residual)?;

            let mut u = y;
            u.as_array_mut().scaled_add(step, gradient.as_array());
            prox_inplace(&mut u, threshold, positive);

            let recon_u = self.op.forward(&u)?;
            let f_u = objective_from(signal, &recon_u, &u, penalty);
            if !f_u.is_finite() {
                tracing::warn!(iteration, "Non-finite objective, aborting");
                return Err(CscError::NumericalDivergence { iteration });
            }

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let accepted = !self.config.monotone || f_u <= f_z;

            let f_prev = f_z;
            let change;
            if accepted {
                let beta = (t - 1.0) / t_next;
                change = match self.config.stopping {
                    StoppingCriterion::Objective => relative(f_prev - f_u, f_prev),
                    StoppingCriterion::Iterate => relative(u.distance(&z), z.l2_norm()),
                };

                y = Codes::from_array(u.as_array() + &((u.as_array() - z.as_array()) * beta));
                recon_y = extrapolate(&recon_u, &recon_z, beta);

                z = u;
                recon_z = recon_u;
                f_z = f_u;
            } else {
                tracing::trace!(iteration, f_u, f_z, "Rejected non-monotone step");
                let gamma = t / t_next;
                y = Codes::from_array(z.as_array() + &((u.as_array() - z.as_array()) * gamma));
                recon_y = recon_z
                    .iter()
                    .zip(&recon_u)
                    .map(|(rz, ru)| rz + gamma * (ru - rz))
                    .collect();
                change = f64::INFINITY;
            }
            t = t_next;

            history.push(f_z);
            tracing::trace!(iteration, objective = f_z, change, "FISTA iteration");

            let state = IterationState {
                iteration,
                objective: f_z,
                codes: &z,
            };
            if observer(&state).is_break() {
                status = SolverStatus::Interrupted;
                break;
            }

            if change < self.config.tolerance {
                status = SolverStatus::Converged;
                break;
            }
        }

        if !z.is_finite() {
            return Err(CscError::NumericalDivergence { iteration: iterations });
        }

        match status {
            SolverStatus::MaxIterationsReached => tracing::warn!(
                iterations,
                objective = f_z,
                "FISTA reached the iteration cap before converging"
            ),
            _ => tracing::debug!(iterations, objective = f_z, ?status, "FISTA finished"),
        }

        let residual_norm = signal
            .iter()
            .zip(&recon_z)
            .map(|(s, r)| (s - r) * (s - r))
            .sum::<f64>()
            .sqrt();

        Ok(SolverOutput {
            codes: z,
            status,
            iterations,
            objective: f_z,
            objective_history: history,
            residual_norm,
            step_size: step,
        })
    }
}

/// Objective `½‖s − D z‖² + λ‖z‖₁` for the given codes.
pub fn objective(op: &ConvOperator, signal: &[f64], codes: &Codes, penalty: f64) -> CscResult<f64> {
    let recon = op.forward(codes)?;
    Ok(objective_from(signal, &recon, codes, penalty))
}

fn objective_from(signal: &[f64], recon: &[f64], codes: &Codes, penalty: f64) -> f64 {
    let sq: f64 = signal.iter().zip(recon).map(|(s, r)| (s - r) * (s - r)).sum();
    0.5 * sq + penalty * codes.l1_norm()
}

/// `a + beta (a − b)`, element-wise.
fn extrapolate(a: &[f64], b: &[f64], beta: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + beta * (x - y)).collect()
}

/// `|delta| / |reference|`, treating a zero reference as exact.
fn relative(delta: f64, reference: f64) -> f64 {
    delta.abs() / reference.abs().max(f64::MIN_POSITIVE)
}
