//! Activation code tensors.
//!
//! Codes are stored as a `K × N` array: row `k` is the activation sequence
//! of atom `k`, and column `n` places the atom starting at sample `n` of
//! the signal (`N = T - L + 1`).

use ndarray::{Array2, ArrayView1, ArrayView2, Zip};

/// Sparse activation codes for one signal.
#[derive(Clone, Debug, PartialEq)]
pub struct Codes {
    data: Array2<f64>,
}

impl Codes {
    /// All-zero codes of shape `(num_atoms, code_len)`.
    pub fn zeros(num_atoms: usize, code_len: usize) -> Self {
        Self {
            data: Array2::zeros((num_atoms, code_len)),
        }
    }

    /// Wrap an existing array.
    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// `(num_atoms, code_len)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Number of atoms `K`.
    #[inline]
    pub fn num_atoms(&self) -> usize {
        self.data.nrows()
    }

    /// Activation length `N`.
    #[inline]
    pub fn code_len(&self) -> usize {
        self.data.ncols()
    }

    /// Read-only view of the full tensor.
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Activation sequence of atom `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is out of range.
    #[inline]
    pub fn row(&self, k: usize) -> ArrayView1<'_, f64> {
        self.data.row(k)
    }

    /// Unwrap into the underlying array.
    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    pub(crate) fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    pub(crate) fn as_array_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    /// Sum of absolute values of all entries.
    pub fn l1_norm(&self) -> f64 {
        self.data.iter().map(|v| v.abs()).sum()
    }

    /// Euclidean (Frobenius) norm.
    pub fn l2_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Euclidean distance to another tensor of the same shape.
    pub fn distance(&self, other: &Codes) -> f64 {
        Zip::from(&self.data)
            .and(&other.data)
            .fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b))
            .sqrt()
    }

    /// Count of entries whose magnitude exceeds `threshold`.
    pub fn count_nonzero(&self, threshold: f64) -> usize {
        self.data.iter().filter(|v| v.abs() > threshold).count()
    }

    /// Fraction of entries that are exactly zero.
    pub fn sparsity(&self) -> f64 {
        let total = self.data.len();
        if total == 0 {
            return 1.0;
        }
        self.data.iter().filter(|&&v| v == 0.0).count() as f64 / total as f64
    }

    /// True when every entry is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Smallest entry, or `None` for an empty tensor.
    pub fn min_value(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    /// Offset and value of the largest-magnitude activation of atom `k`.
    pub fn dominant(&self, k: usize) -> Option<(usize, f64)> {
        if k >= self.num_atoms() {
            return None;
        }
        self.data
            .row(k)
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| *v != 0.0)
            .fold(None, |best: Option<(usize, f64)>, (n, v)| match best {
                Some((_, b)) if b.abs() >= v.abs() => best,
                _ => Some((n, v)),
            })
    }

    /// True when all entries are finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}
