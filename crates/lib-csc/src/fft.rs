//! FFT planning and spectra.
//!
//! [`FftEngine`] owns the rustfft/realfft planners so repeated sizes reuse
//! their twiddle tables. Plans handed out as [`FftPlans`] are `Send + Sync`
//! and can be shared by the parallel overlap-save workers.

use crate::error::{CscError, CscResult};
use num_complex::Complex64;
use realfft::RealFftPlanner;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Planner cache for complex and real transforms.
pub struct FftEngine {
    complex_planner: FftPlanner<f64>,
    real_planner: RealFftPlanner<f64>,
}

/// Forward/inverse plan pair for one power-of-two size.
#[derive(Clone)]
pub struct FftPlans {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    len: usize,
}

impl FftPlans {
    /// Transform length.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// In-place forward transform. `data.len()` must equal [`Self::size`].
    pub fn forward(&self, data: &mut [Complex64]) {
        self.forward.process(data);
    }

    /// In-place inverse transform, scaled by `1 / len`.
    pub fn inverse(&self, data: &mut [Complex64]) {
        self.inverse.process(data);
        let scale = 1.0 / self.len as f64;
        data.iter_mut().for_each(|x| *x *= scale);
    }
}

impl FftEngine {
    pub fn new() -> Self {
        Self {
            complex_planner: FftPlanner::new(),
            real_planner: RealFftPlanner::new(),
        }
    }

    /// Plan both directions for `len` samples.
    pub fn plans(&mut self, len: usize) -> CscResult<FftPlans> {
        check_size(len)?;
        Ok(FftPlans {
            forward: self.complex_planner.plan_fft_forward(len),
            inverse: self.complex_planner.plan_fft_inverse(len),
            len,
        })
    }

    /// Complex spectrum of real `values` zero-padded to `fft_size`.
    pub fn spectrum(&mut self, values: &[f64], fft_size: usize) -> CscResult<Vec<Complex64>> {
        check_padding(values.len(), fft_size)?;
        let plans = self.plans(fft_size)?;

        let mut buf = vec![Complex64::new(0.0, 0.0); fft_size];
        for (b, &v) in buf.iter_mut().zip(values) {
            b.re = v;
        }
        plans.forward(&mut buf);
        Ok(buf)
    }

    /// `|X(ω)|²` for `values` zero-padded to `fft_size`, bins `0..=fft_size/2`.
    ///
    /// Uses a real-input transform, so only the non-negative half is
    /// returned.
    pub fn power_spectrum(&mut self, values: &[f64], fft_size: usize) -> CscResult<Vec<f64>> {
        check_padding(values.len(), fft_size)?;
        check_size(fft_size)?;

        let r2c = self.real_planner.plan_fft_forward(fft_size);
        let mut input = values.to_vec();
        input.resize(fft_size, 0.0);
        let mut output = r2c.make_output_vec();
        r2c.process(&mut input, &mut output)
            .map_err(|e| CscError::InvalidConfig(e.to_string()))?;

        Ok(output.iter().map(|c| c.norm_sqr()).collect())
    }
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn check_size(len: usize) -> CscResult<()> {
    if len == 0 || !len.is_power_of_two() {
        return Err(CscError::InvalidFftSize(len));
    }
    Ok(())
}

fn check_padding(values_len: usize, fft_size: usize) -> CscResult<()> {
    if fft_size < values_len {
        return Err(CscError::InvalidConfig(format!(
            "FFT size {} is smaller than input length {}",
            fft_size, values_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_plans_roundtrip() {
        let mut engine = FftEngine::new();
        let plans = engine.plans(64).unwrap();

        let signal: Vec<Complex64> = (0..64)
            .map(|i| Complex64::new((2.0 * PI * 4.0 * i as f64 / 64.0).sin(), 0.0))
            .collect();
        let mut data = signal.clone();
        plans.forward(&mut data);
        plans.inverse(&mut data);

        for (orig, rec) in signal.iter().zip(&data) {
            assert!((orig - rec).norm() < 1e-10);
        }
    }

    #[test]
    fn test_power_spectrum_of_delta_is_flat() {
        let mut engine = FftEngine::new();
        let spectrum = engine.power_spectrum(&[2.0], 16).unwrap();

        assert_eq!(spectrum.len(), 9);
        assert!(spectrum.iter().all(|p| (p - 4.0).abs() < 1e-12));
    }

    #[test]
    fn test_spectra_agree_at_dc() {
        let mut engine = FftEngine::new();
        let atom = [0.0, 1.0, 1.0, 1.0, 0.0];

        let power = engine.power_spectrum(&atom, 64).unwrap();
        let complex = engine.spectrum(&atom, 64).unwrap();
        assert!((power[0] - 9.0).abs() < 1e-10);
        assert!((complex[0].re - 3.0).abs() < 1e-10);
        assert!((complex[5].norm_sqr() - power[5]).abs() < 1e-10);
    }

    #[test]
    fn test_invalid_sizes() {
        let mut engine = FftEngine::new();
        assert!(matches!(engine.plans(100), Err(CscError::InvalidFftSize(100))));
        assert!(matches!(engine.plans(0), Err(CscError::InvalidFftSize(0))));
        assert!(matches!(
            engine.power_spectrum(&[1.0; 8], 4),
            Err(CscError::InvalidConfig(_))
        ));
    }
}
