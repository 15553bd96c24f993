//! # lib-types
//!
//! Core type definitions shared across the sparse-kernel workspace:
//! - Time and frequency units with compile-time safety
//! - Uniformly-sampled signal representation and padding helpers

pub mod units;
pub mod signal;

pub use units::*;
pub use signal::*;
