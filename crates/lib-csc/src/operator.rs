//! Dictionary convolution operator and its adjoint.
//!
//! # Alignment
//!
//! Codes have length `N = T - L + 1`, so the full convolution of a code row
//! with its atom has length exactly `T` and no cropping is needed:
//!
//! ```text
//! forward(z)[t]   = Σ_k Σ_j d_k[j] · z_k[t − j]        t ∈ [0, T)
//! adjoint(r)_k[n] = Σ_j d_k[j] · r[n + j]              n ∈ [0, N)
//! ```
//!
//! An atom placed at offset `n` therefore occupies samples `n..n + L`, and
//! `adjoint` (valid cross-correlation) is the exact transpose of `forward`.

use crate::codes::Codes;
use crate::convolution::{convolve_accumulate, correlate_valid, ConvolutionEngine, FftSizeStrategy};
use crate::dictionary::Dictionary;
use crate::error::{CscError, CscResult};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Atoms at least this long use the overlap-save engine under `Auto`.
pub const OVERLAP_SAVE_MIN_ATOM_LEN: usize = 64;

/// Multiply-adds per call above which atoms are processed in parallel.
const PARALLEL_MIN_WORK: usize = 1 << 18;

/// How per-atom convolutions are evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvolutionMethod {
    /// Direct for short atoms, overlap-save for long ones.
    #[default]
    Auto,
    /// Direct time-domain loops.
    Direct,
    /// FFT overlap-save with per-atom precomputed spectra.
    OverlapSave,
}

/// Forward and adjoint engines for one atom.
#[derive(Debug)]
struct AtomEngines {
    forward: ConvolutionEngine,
    adjoint: ConvolutionEngine,
}

/// Linear operator mapping codes to a reconstruction, plus its adjoint.
#[derive(Debug)]
pub struct ConvOperator {
    dictionary: Dictionary,
    method: ConvolutionMethod,
    engines: Vec<AtomEngines>,
}

impl ConvOperator {
    /// Build the operator, planning FFT engines when needed.
    pub fn new(dictionary: Dictionary, method: ConvolutionMethod) -> CscResult<Self> {
        let method = match method {
            ConvolutionMethod::Auto if dictionary.atom_len() >= OVERLAP_SAVE_MIN_ATOM_LEN => {
                ConvolutionMethod::OverlapSave
            }
            ConvolutionMethod::Auto => ConvolutionMethod::Direct,
            m => m,
        };

        let engines = if method == ConvolutionMethod::OverlapSave {
            dictionary
                .atoms()
                .iter()
                .map(|atom| {
                    Ok(AtomEngines {
                        forward: ConvolutionEngine::with_strategy(atom, FftSizeStrategy::Auto)?,
                        adjoint: ConvolutionEngine::with_strategy(&atom.reversed(), FftSizeStrategy::Auto)?,
                    })
                })
                .collect::<CscResult<Vec<_>>>()?
        } else {
            Vec::new()
        };

        tracing::debug!(
            atoms = dictionary.len(),
            atom_len = dictionary.atom_len(),
            ?method,
            fft_size = engines.first().map(|e| e.forward.fft_size()),
            "Convolution operator ready"
        );

        Ok(Self {
            dictionary,
            method,
            engines,
        })
    }

    /// The dictionary this operator convolves with.
    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Resolved evaluation method (never `Auto`).
    #[inline]
    pub fn method(&self) -> ConvolutionMethod {
        self.method
    }

    /// Sum of per-atom full convolutions; output length `N + L - 1`.
    pub fn forward(&self, codes: &Codes) -> CscResult<Vec<f64>> {
        self.check_atoms(codes)?;
        let code_len = codes.code_len();
        let signal_len = code_len + self.dictionary.atom_len() - 1;
        let z = codes.as_array();

        if self.method == ConvolutionMethod::Direct && !self.is_parallel(signal_len) {
            return reconstruct(&self.dictionary, codes);
        }

        let contributions: Vec<Vec<f64>> = if self.is_parallel(signal_len) {
            (0..self.dictionary.len())
                .into_par_iter()
                .map(|k| self.forward_atom(k, z.row(k), signal_len))
                .collect()
        } else {
            (0..self.dictionary.len())
                .map(|k| self.forward_atom(k, z.row(k), signal_len))
                .collect()
        };

        // Summed in dictionary order for reproducible rounding
        let mut output = vec![0.0; signal_len];
        for contribution in contributions {
            for (o, v) in output.iter_mut().zip(contribution) {
                *o += v;
            }
        }
        Ok(output)
    }

    /// Valid cross-correlation of `residual` with each atom; shape `(K, T - L + 1)`.
    pub fn adjoint(&self, residual: &[f64]) -> CscResult<Codes> {
        let code_len = self.dictionary.code_len(residual.len())?;
        let num_atoms = self.dictionary.len();

        let rows: Vec<Vec<f64>> = if self.is_parallel(residual.len()) {
            (0..num_atoms)
                .into_par_iter()
                .map(|k| self.adjoint_atom(k, residual, code_len))
                .collect()
        } else {
            (0..num_atoms)
                .map(|k| self.adjoint_atom(k, residual, code_len))
                .collect()
        };

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((num_atoms, code_len), flat)
            .map_err(|e| CscError::InvalidConfig(e.to_string()))?;
        Ok(Codes::from_array(data))
    }

    fn forward_atom(&self, k: usize, row: ArrayView1<'_, f64>, signal_len: usize) -> Vec<f64> {
        with_slice(row, |code| match self.method {
            ConvolutionMethod::OverlapSave => {
                let mut out = self.engines[k].forward.convolve(code);
                out.resize(signal_len, 0.0);
                out
            }
            _ => {
                let mut out = vec![0.0; signal_len];
                convolve_accumulate(code, &self.dictionary.atoms()[k], &mut out);
                out
            }
        })
    }

    fn adjoint_atom(&self, k: usize, residual: &[f64], code_len: usize) -> Vec<f64> {
        match self.method {
            ConvolutionMethod::OverlapSave => {
                // Convolving with the reversed atom and skipping L - 1 samples
                // yields the valid correlation.
                let full = self.engines[k].adjoint.convolve(residual);
                let start = self.dictionary.atom_len() - 1;
                full[start..start + code_len].to_vec()
            }
            _ => correlate_valid(residual, &self.dictionary.atoms()[k]),
        }
    }

    fn check_atoms(&self, codes: &Codes) -> CscResult<()> {
        if codes.num_atoms() != self.dictionary.len() {
            return Err(CscError::ShapeMismatch {
                expected: (self.dictionary.len(), codes.code_len()),
                actual: codes.shape(),
            });
        }
        Ok(())
    }

    fn is_parallel(&self, signal_len: usize) -> bool {
        let per_atom = match self.method {
            ConvolutionMethod::OverlapSave => signal_len * 16,
            _ => signal_len * self.dictionary.atom_len(),
        };
        self.dictionary.len() > 1 && per_atom * self.dictionary.len() >= PARALLEL_MIN_WORK
    }
}

/// Direct, single-threaded forward model without a planned operator.
///
/// Equivalent to [`ConvOperator::forward`] with [`ConvolutionMethod::Direct`].
pub fn reconstruct(dictionary: &Dictionary, codes: &Codes) -> CscResult<Vec<f64>> {
    if codes.num_atoms() != dictionary.len() {
        return Err(CscError::ShapeMismatch {
            expected: (dictionary.len(), codes.code_len()),
            actual: codes.shape(),
        });
    }
    let mut output = vec![0.0; codes.code_len() + dictionary.atom_len() - 1];
    for (k, atom) in dictionary.atoms().iter().enumerate() {
        with_slice(codes.row(k), |code| convolve_accumulate(code, atom, &mut output));
    }
    Ok(output)
}

/// Run `f` on a contiguous slice of `row`, copying only if needed.
fn with_slice<R>(row: ArrayView1<'_, f64>, f: impl FnOnce(&[f64]) -> R) -> R {
    match row.as_slice() {
        Some(slice) => f(slice),
        None => f(&row.to_vec()),
    }
}

/// Dot product of two equal-length slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scenario_dictionary() -> Dictionary {
        Dictionary::new(vec![vec![0.0, 1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0, 0.0]]).unwrap()
    }

    fn random_codes(rng: &mut StdRng, k: usize, n: usize) -> Codes {
        Codes::from_array(Array2::from_shape_fn((k, n), |_| rng.gen_range(-1.0..1.0)))
    }

    fn codes_dot(a: &Codes, b: &Codes) -> f64 {
        a.view().iter().zip(b.view().iter()).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_codes_reconstruct_zero() {
        let op = ConvOperator::new(scenario_dictionary(), ConvolutionMethod::Direct).unwrap();
        let recon = op.forward(&Codes::zeros(2, 16)).unwrap();

        assert_eq!(recon.len(), 20);
        assert!(recon.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_placement_alignment() {
        let op = ConvOperator::new(scenario_dictionary(), ConvolutionMethod::Direct).unwrap();
        let mut codes = Codes::zeros(2, 16);
        codes.as_array_mut()[[0, 3]] = 1.0;
        codes.as_array_mut()[[1, 12]] = 2.0;

        let recon = op.forward(&codes).unwrap();
        let mut expected = vec![0.0; 20];
        expected[4] = 1.0;
        expected[5] = 1.0;
        expected[6] = 1.0;
        expected[14] = 2.0;
        assert_eq!(recon, expected);
    }

    #[test]
    fn test_adjointness_direct() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let k = rng.gen_range(1..4);
            let l = rng.gen_range(1..9);
            let t = l + rng.gen_range(0..40);
            let atoms: Vec<Vec<f64>> = (0..k)
                .map(|_| (0..l).map(|_| rng.gen_range(-1.0..1.0)).collect())
                .collect();
            let op = ConvOperator::new(Dictionary::new(atoms).unwrap(), ConvolutionMethod::Direct).unwrap();

            let z = random_codes(&mut rng, k, t - l + 1);
            let r: Vec<f64> = (0..t).map(|_| rng.gen_range(-1.0..1.0)).collect();

            let lhs = dot(&op.forward(&z).unwrap(), &r);
            let rhs = codes_dot(&z, &op.adjoint(&r).unwrap());
            assert!((lhs - rhs).abs() < 1e-10 * (1.0 + lhs.abs()), "{} vs {}", lhs, rhs);
        }
    }

    #[test]
    fn test_overlap_save_matches_direct() {
        let mut rng = StdRng::seed_from_u64(11);
        let atoms: Vec<Vec<f64>> = (0..3)
            .map(|_| (0..80).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let dict = Dictionary::new(atoms).unwrap();
        let direct = ConvOperator::new(dict.clone(), ConvolutionMethod::Direct).unwrap();
        let fft = ConvOperator::new(dict, ConvolutionMethod::Auto).unwrap();
        assert_eq!(fft.method(), ConvolutionMethod::OverlapSave);

        let t = 3000;
        let z = random_codes(&mut rng, 3, t - 80 + 1);
        let r: Vec<f64> = (0..t).map(|_| rng.gen_range(-1.0..1.0)).collect();

        for (a, b) in direct.forward(&z).unwrap().iter().zip(fft.forward(&z).unwrap().iter()) {
            assert!((a - b).abs() < 1e-8);
        }
        let ga = direct.adjoint(&r).unwrap();
        let gb = fft.adjoint(&r).unwrap();
        assert_eq!(ga.shape(), gb.shape());
        assert!(ga.distance(&gb) < 1e-8);

        let lhs = dot(&fft.forward(&z).unwrap(), &r);
        let rhs = codes_dot(&z, &gb);
        assert!((lhs - rhs).abs() < 1e-7 * (1.0 + lhs.abs()));
    }

    #[test]
    fn test_rejects_short_residual_and_bad_shape() {
        let op = ConvOperator::new(scenario_dictionary(), ConvolutionMethod::Direct).unwrap();
        assert!(matches!(
            op.adjoint(&[0.0; 4]),
            Err(CscError::InvalidInputLength { signal_len: 4, atom_len: 5 })
        ));
        assert!(matches!(
            op.forward(&Codes::zeros(3, 16)),
            Err(CscError::ShapeMismatch { .. })
        ));
    }
}
