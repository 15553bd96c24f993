//! Proximal operators for the L1 penalty.
//!
//! For `g(z) = λ‖z‖₁` and step `α`, the proximal map is element-wise
//! shrinkage by `τ = α·λ`:
//!
//! ```text
//! two-sided:  sign(x) · max(|x| − τ, 0)
//! one-sided:  max(x − τ, 0)             (adds the constraint z ≥ 0)
//! ```

use crate::codes::Codes;

/// Shrink a single value toward zero by `threshold`.
#[inline]
pub fn shrink(x: f64, threshold: f64, positive: bool) -> f64 {
    if positive {
        (x - threshold).max(0.0)
    } else if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

/// Apply shrinkage to every entry of `candidate`, returning new codes.
pub fn prox(candidate: &Codes, threshold: f64, positive: bool) -> Codes {
    let mut out = candidate.clone();
    prox_inplace(&mut out, threshold, positive);
    out
}

/// Apply shrinkage to every entry of `codes` in place.
pub fn prox_inplace(codes: &mut Codes, threshold: f64, positive: bool) {
    codes
        .as_array_mut()
        .mapv_inplace(|x| shrink(x, threshold, positive));
}
