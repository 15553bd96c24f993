//! # lib-csc
//!
//! Convolutional sparse coding over a fixed dictionary of atoms.
//!
//! Given a 1-D signal `s` of length `T` and `K` atoms `d_k` of length `L`,
//! finds activation codes `z` (`K × (T − L + 1)`) minimizing
//!
//! ```text
//! ½‖s − Σ_k d_k * z_k‖² + λ‖z‖₁        optionally with z ≥ 0
//! ```
//!
//! using FISTA with a monotone safeguard.
//!
//! - **Operator**: dictionary convolution and its exact adjoint, direct or
//!   FFT overlap-save, parallel across atoms with Rayon
//! - **Step size**: atom-energy bound, spectral peak or power iteration
//! - **Solver**: FISTA/MFISTA with objective or iterate stopping
//! - **Coder**: stateful `fit`/`predict` facade plus stateless `solve`
//! - **Events**: thresholded, de-duplicated activations for detection

pub mod error;
pub mod fft;
pub mod convolution;
pub mod dictionary;
pub mod codes;
pub mod operator;
pub mod prox;
pub mod lipschitz;
pub mod solver;
pub mod coder;
pub mod events;

pub use error::{CscError, CscResult};
pub use dictionary::{Atom, Dictionary};
pub use codes::Codes;
pub use operator::{ConvOperator, ConvolutionMethod};
pub use lipschitz::{lipschitz_estimate, LipschitzMethod};
pub use solver::{SolverConfig, SolverStatus, StoppingCriterion};
pub use coder::{FitResult, SparseCoder};
pub use events::{extract_activations, Activation, EventConfig};
