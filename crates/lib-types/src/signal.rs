//! Uniformly-sampled sensor signals.
//!
//! # Sample Semantics
//!
//! Samples in a `Signal` are point measurements at discrete time instants.
//! For a signal with `N` samples, the sample times are:
//!
//! ```text
//! t[i] = t_start + i * dt,  for i = 0, 1, ..., N-1
//! ```
//!
//! Code offsets produced by the sparse coder index the same grid: an atom
//! placed at offset `n` starts at time `t[n]`.

use crate::units::{Hertz, Seconds};
use serde::{Deserialize, Serialize};

/// A uniformly-sampled single-channel signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Sample values (acceleration, angular rate, or normalized units).
    pub samples: Vec<f64>,

    /// Time step between consecutive samples.
    pub dt: Seconds,

    /// Time of the first sample.
    pub t_start: Seconds,
}

impl Signal {
    /// Create a new signal from samples.
    pub fn new(samples: Vec<f64>, dt: Seconds, t_start: Seconds) -> Self {
        Self { samples, dt, t_start }
    }

    /// Create a signal sampled at `rate`, starting at t = 0.
    pub fn from_rate(samples: Vec<f64>, rate: Hertz) -> Self {
        Self::new(samples, rate.to_period(), Seconds::ZERO)
    }

    /// Create a zero-valued signal of specified length.
    pub fn zeros(len: usize, dt: Seconds) -> Self {
        Self {
            samples: vec![0.0; len],
            dt,
            t_start: Seconds::ZERO,
        }
    }

    /// Number of samples in the signal.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the signal is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total duration of the signal (`N * dt`).
    #[inline]
    pub fn duration(&self) -> Seconds {
        self.dt * self.samples.len() as f64
    }

    /// Get the time value for a given sample index.
    #[inline]
    pub fn time_at(&self, index: usize) -> Seconds {
        self.t_start + self.dt * index as f64
    }

    /// Sample rate (reciprocal of dt).
    #[inline]
    pub fn sample_rate(&self) -> Hertz {
        self.dt.to_frequency()
    }

    /// Maximum absolute value.
    pub fn max_abs(&self) -> f64 {
        self.samples.iter().map(|v| v.abs()).fold(0.0, f64::max)
    }

    /// Root mean square value.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|v| v * v).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }

    /// Squared Euclidean norm of the samples.
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|v| v * v).sum()
    }

    /// Subtract the mean so the signal is centered on zero.
    pub fn remove_mean(&mut self) {
        if self.samples.is_empty() {
            return;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        for sample in &mut self.samples {
            *sample -= mean;
        }
    }

    /// Right-pad the signal with zeros up to `new_len` samples.
    ///
    /// Signals already at least `new_len` long are left untouched.
    pub fn zero_pad(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            self.samples.resize(new_len, 0.0);
        }
    }

    /// Index of the first non-finite sample, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.samples.iter().position(|v| !v.is_finite())
    }

    /// Mean squared error against another sequence of the same length.
    ///
    /// Returns `None` when the lengths differ or the signal is empty.
    pub fn mse(&self, other: &[f64]) -> Option<f64> {
        mean_squared_error(&self.samples, other)
    }
}

/// Right-pad `values` with trailing zeros to `len`.
///
/// Sequences longer than `len` are returned unchanged.
pub fn pad_to(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    if len > out.len() {
        out.resize(len, 0.0);
    }
    out
}

/// Mean squared error between two equal-length sequences.
pub fn mean_squared_error(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum / a.len() as f64)
}
