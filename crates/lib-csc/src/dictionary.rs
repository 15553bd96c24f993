//! Fixed atom dictionaries.
//!
//! A dictionary is an ordered set of `K ≥ 1` atoms sharing one length `L`.
//! It is validated once at construction and never mutated afterwards; all
//! accessors hand out shared slices only.

use crate::error::{CscError, CscResult};
use lib_types::signal::pad_to;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A short template waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct Atom(Vec<f64>);

impl Atom {
    /// Atom samples.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Squared Euclidean norm.
    pub fn energy(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum()
    }

    /// Sum of absolute values.
    pub fn l1_norm(&self) -> f64 {
        self.0.iter().map(|v| v.abs()).sum()
    }

    /// Time-reversed copy, the kernel of the adjoint correlation.
    pub fn reversed(&self) -> Vec<f64> {
        self.0.iter().rev().copied().collect()
    }
}

impl Deref for Atom {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// Ordered, immutable collection of equal-length atoms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Dictionary {
    atoms: Vec<Atom>,
    atom_len: usize,
}

impl Dictionary {
    /// Build a dictionary, rejecting ragged, empty, or non-finite atoms.
    pub fn new(atoms: Vec<Vec<f64>>) -> CscResult<Self> {
        let first_len = match atoms.first() {
            Some(a) => a.len(),
            None => {
                return Err(CscError::InvalidDictionary(
                    "dictionary must contain at least one atom".into(),
                ))
            }
        };
        if first_len == 0 {
            return Err(CscError::InvalidDictionary("atoms must not be empty".into()));
        }

        for (k, atom) in atoms.iter().enumerate() {
            if atom.len() != first_len {
                return Err(CscError::InvalidDictionary(format!(
                    "atom {} has length {}, expected {}",
                    k,
                    atom.len(),
                    first_len
                )));
            }
            if let Some(i) = atom.iter().position(|v| !v.is_finite()) {
                return Err(CscError::InvalidDictionary(format!(
                    "atom {} has a non-finite value at index {}",
                    k, i
                )));
            }
        }

        Ok(Self {
            atoms: atoms.into_iter().map(Atom).collect(),
            atom_len: first_len,
        })
    }

    /// Build a dictionary from atoms of varying length.
    ///
    /// Shorter atoms are right-padded with zeros to the longest length.
    pub fn from_padded(atoms: Vec<Vec<f64>>) -> CscResult<Self> {
        let max_len = atoms.iter().map(Vec::len).max().unwrap_or(0);
        let padded = atoms.iter().map(|a| pad_to(a, max_len)).collect();
        Self::new(padded)
    }

    /// Number of atoms `K`.
    #[inline]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Always false for a constructed dictionary.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Shared atom length `L`.
    #[inline]
    pub fn atom_len(&self) -> usize {
        self.atom_len
    }

    /// Read-only view of the atoms, in dictionary order.
    #[inline]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Samples of atom `k`.
    pub fn atom(&self, k: usize) -> Option<&[f64]> {
        self.atoms.get(k).map(Atom::as_slice)
    }

    /// Code length `T - L + 1` for a signal of length `signal_len`.
    pub fn code_len(&self, signal_len: usize) -> CscResult<usize> {
        if signal_len < self.atom_len {
            return Err(CscError::InvalidInputLength {
                signal_len,
                atom_len: self.atom_len,
            });
        }
        Ok(signal_len - self.atom_len + 1)
    }

    /// True when every atom is identically zero.
    pub fn is_all_zero(&self) -> bool {
        self.atoms.iter().all(|a| a.iter().all(|&v| v == 0.0))
    }
}

impl TryFrom<Vec<Vec<f64>>> for Dictionary {
    type Error = CscError;

    fn try_from(atoms: Vec<Vec<f64>>) -> CscResult<Self> {
        Self::new(atoms)
    }
}

impl From<Dictionary> for Vec<Vec<f64>> {
    fn from(dict: Dictionary) -> Self {
        dict.atoms.into_iter().map(|a| a.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_dictionary() {
        let dict = Dictionary::new(vec![vec![0.0, 1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0, 0.0]]).unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.atom_len(), 5);
        assert_eq!(dict.atom(1), Some(&[0.0, 0.0, 1.0, 0.0, 0.0][..]));
        assert_eq!(dict.atom(2), None);
        assert!((dict.atoms()[0].energy() - 3.0).abs() < 1e-12);
        assert!((dict.atoms()[0].l1_norm() - 3.0).abs() < 1e-12);
        assert_eq!(dict.code_len(20).unwrap(), 16);
    }

    #[test]
    fn test_rejects_invalid_dictionaries() {
        assert!(matches!(Dictionary::new(vec![]), Err(CscError::InvalidDictionary(_))));
        assert!(matches!(Dictionary::new(vec![vec![]]), Err(CscError::InvalidDictionary(_))));
        assert!(matches!(
            Dictionary::new(vec![vec![1.0, 2.0], vec![1.0]]),
            Err(CscError::InvalidDictionary(_))
        ));
        assert!(matches!(
            Dictionary::new(vec![vec![1.0, f64::INFINITY]]),
            Err(CscError::InvalidDictionary(_))
        ));
    }

    #[test]
    fn test_code_len_rejects_short_signal() {
        let dict = Dictionary::new(vec![vec![1.0; 5]]).unwrap();
        assert!(matches!(
            dict.code_len(4),
            Err(CscError::InvalidInputLength { signal_len: 4, atom_len: 5 })
        ));
    }

    #[test]
    fn test_from_padded() {
        let dict = Dictionary::from_padded(vec![vec![1.0, 2.0, 3.0], vec![4.0]]).unwrap();
        assert_eq!(dict.atom_len(), 3);
        assert_eq!(dict.atom(1), Some(&[4.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_serde_validates() {
        let dict: Dictionary = serde_json::from_str("[[1.0, 0.5], [0.0, 1.0]]").unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(serde_json::to_string(&dict).unwrap(), "[[1.0,0.5],[0.0,1.0]]");

        let ragged: Result<Dictionary, _> = serde_json::from_str("[[1.0, 0.5], [1.0]]");
        assert!(ragged.is_err());
    }

    #[test]
    fn test_all_zero() {
        assert!(Dictionary::new(vec![vec![0.0; 3]]).unwrap().is_all_zero());
        assert!(!Dictionary::new(vec![vec![0.0, 1e-9, 0.0]]).unwrap().is_all_zero());
    }
}
