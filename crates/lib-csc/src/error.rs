//! Error types for sparse coding operations.

use thiserror::Error;

/// Errors that can occur while building a dictionary or coding a signal.
#[derive(Debug, Error)]
pub enum CscError {
    /// Dictionary is empty, ragged, or contains non-finite values.
    #[error("Invalid dictionary: {0}")]
    InvalidDictionary(String),

    /// Signal is shorter than the atoms.
    #[error("Signal of length {signal_len} is shorter than atom length {atom_len}")]
    InvalidInputLength { signal_len: usize, atom_len: usize },

    /// Penalty weight must be strictly positive and finite.
    #[error("Penalty must be positive and finite, got {0}")]
    InvalidPenalty(f64),

    /// Signal contains NaN or infinity.
    #[error("Non-finite signal sample at index {index}")]
    NonFiniteInput { index: usize },

    /// Step-size estimation produced no positive finite bound.
    #[error("Degenerate dictionary: Lipschitz estimate is not positive and finite")]
    DegenerateDictionary,

    /// Non-finite value encountered while iterating.
    #[error("Numerical divergence at iteration {iteration}")]
    NumericalDivergence { iteration: usize },

    /// Codes or reconstruction requested before a successful fit.
    #[error("Coder has not been fitted")]
    NotFitted,

    /// Warm-start codes do not match the problem shape.
    #[error("Code shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// FFT size is not a power of 2.
    #[error("FFT size must be power of 2, got {0}")]
    InvalidFftSize(usize),

    /// Invalid solver or engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sparse coding operations.
pub type CscResult<T> = Result<T, CscError>;
