//! Single-kernel convolution primitives.
//!
//! Two evaluation paths are provided:
//!
//! - Direct O(n·m) loops, which skip zero input samples. Sparse codes are
//!   mostly zeros, so this is the fast path for short atoms.
//! - An overlap-save FFT engine with a pre-computed kernel spectrum, for
//!   long atoms over long signals. Chunks are processed in parallel with
//!   Rayon once there are enough of them.
//!
//! Both paths compute the same "full" linear convolution of length
//! `input_len + kernel_len - 1`.

use crate::error::{CscError, CscResult};
use crate::fft::{FftEngine, FftPlans};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// FFT sizing strategy for the overlap-save engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FftSizeStrategy {
    /// Automatic sizing: 4x kernel length, minimum 1024.
    #[default]
    Auto,

    /// User-specified fixed size.
    ///
    /// Must be a power of 2 and at least the kernel length.
    Fixed { size: usize },
}

/// Overlap-save convolution engine for one fixed kernel.
pub struct ConvolutionEngine {
    /// Pre-computed FFT of the zero-padded kernel.
    kernel_fft: Vec<Complex64>,

    /// FFT size (power of 2).
    fft_size: usize,

    /// Overlap size (kernel length - 1).
    overlap: usize,

    /// Valid output size per chunk.
    valid_size: usize,

    /// Original kernel length.
    kernel_len: usize,

    plans: FftPlans,
}

impl ConvolutionEngine {
    /// Create a convolution engine with automatic FFT sizing.
    pub fn new(kernel: &[f64]) -> CscResult<Self> {
        Self::with_strategy(kernel, FftSizeStrategy::Auto)
    }

    /// Create a convolution engine with a custom FFT sizing strategy.
    pub fn with_strategy(kernel: &[f64], strategy: FftSizeStrategy) -> CscResult<Self> {
        let kernel_len = kernel.len();
        if kernel_len == 0 {
            return Err(CscError::InvalidConfig("empty convolution kernel".into()));
        }

        let fft_size = match strategy {
            FftSizeStrategy::Auto => (kernel_len * 4).next_power_of_two().max(1024),
            FftSizeStrategy::Fixed { size } => {
                if !size.is_power_of_two() {
                    return Err(CscError::InvalidFftSize(size));
                }
                if size < kernel_len {
                    return Err(CscError::InvalidConfig(format!(
                        "FFT size {} is smaller than kernel length {}",
                        size, kernel_len
                    )));
                }
                size
            }
        };
        let overlap = kernel_len - 1;
        let valid_size = fft_size - overlap;

        tracing::debug!(fft_size, kernel_len, valid_size, "ConvolutionEngine planned");

        let mut engine = FftEngine::new();
        let plans = engine.plans(fft_size)?;
        let kernel_fft = engine.spectrum(kernel, fft_size)?;

        Ok(Self {
            kernel_fft,
            fft_size,
            overlap,
            valid_size,
            kernel_len,
            plans,
        })
    }

    /// Full linear convolution of `input` with the kernel.
    ///
    /// Output length is `input.len() + kernel_len - 1`, or zero for an
    /// empty input.
    pub fn convolve(&self, input: &[f64]) -> Vec<f64> {
        if input.is_empty() {
            return Vec::new();
        }
        let output_len = input.len() + self.kernel_len - 1;
        let num_chunks = (output_len + self.valid_size - 1) / self.valid_size;

        let mut output = vec![0.0; output_len];

        if num_chunks <= 2 {
            for chunk_idx in 0..num_chunks {
                let chunk = self.convolve_chunk(input, chunk_idx);
                self.place_chunk(&mut output, chunk_idx, &chunk);
            }
        } else {
            let chunk_results: Vec<(usize, Vec<f64>)> = (0..num_chunks)
                .into_par_iter()
                .map(|chunk_idx| (chunk_idx, self.convolve_chunk(input, chunk_idx)))
                .collect();

            for (chunk_idx, chunk) in chunk_results {
                self.place_chunk(&mut output, chunk_idx, &chunk);
            }
        }

        output
    }

    /// Convolve one overlap-save block and keep its valid samples.
    fn convolve_chunk(&self, input: &[f64], chunk_idx: usize) -> Vec<f64> {
        // Each block starts `overlap` samples before its first valid output
        let input_pos = (chunk_idx * self.valid_size) as isize - self.overlap as isize;

        let mut buf: Vec<Complex64> = (0..self.fft_size)
            .map(|i| {
                let src_idx = input_pos + i as isize;
                if src_idx >= 0 && (src_idx as usize) < input.len() {
                    Complex64::new(input[src_idx as usize], 0.0)
                } else {
                    Complex64::new(0.0, 0.0)
                }
            })
            .collect();

        self.plans.forward(&mut buf);
        for (c, h) in buf.iter_mut().zip(self.kernel_fft.iter()) {
            *c *= *h;
        }
        self.plans.inverse(&mut buf);

        // The first `overlap` samples are corrupted by circular wrap-around
        buf[self.overlap..].iter().map(|c| c.re).collect()
    }

    fn place_chunk(&self, output: &mut [f64], chunk_idx: usize, chunk: &[f64]) {
        let start = chunk_idx * self.valid_size;
        if start >= output.len() {
            return;
        }
        let end = (start + self.valid_size).min(output.len());
        output[start..end].copy_from_slice(&chunk[..end - start]);
    }

    /// Get the FFT size being used.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

impl fmt::Debug for ConvolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvolutionEngine")
            .field("kernel_len", &self.kernel_len)
            .field("fft_size", &self.fft_size)
            .field("valid_size", &self.valid_size)
            .finish()
    }
}

/// Direct full convolution.
///
/// This is O(n*m) and is intended for short kernels.
pub fn direct_convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let mut output = vec![0.0; signal.len() + kernel.len() - 1];
    convolve_accumulate(signal, kernel, &mut output);
    output
}

/// Accumulate the full convolution of `signal` and `kernel` into `output`.
///
/// `output` must hold at least `signal.len() + kernel.len() - 1` samples.
/// Zero input samples are skipped.
pub fn convolve_accumulate(signal: &[f64], kernel: &[f64], output: &mut [f64]) {
    debug_assert!(output.len() + 1 >= signal.len() + kernel.len());

    for (i, &s) in signal.iter().enumerate() {
        if s == 0.0 {
            continue;
        }
        for (o, &k) in output[i..i + kernel.len()].iter_mut().zip(kernel) {
            *o += s * k;
        }
    }
}

/// Valid-mode cross-correlation: `out[n] = Σ_j kernel[j] · signal[n + j]`.
///
/// Output length is `signal.len() - kernel.len() + 1`; empty when the
/// kernel is longer than the signal.
pub fn correlate_valid(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if kernel.is_empty() || signal.len() < kernel.len() {
        return Vec::new();
    }
    signal
        .windows(kernel.len())
        .map(|w| w.iter().zip(kernel).map(|(s, k)| s * k).sum())
        .collect()
}
