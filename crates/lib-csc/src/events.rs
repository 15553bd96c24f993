//! Event extraction from activation codes.
//!
//! A nonzero code `z_k[n]` says atom `k` occurs at sample offset `n` with
//! amplitude `z_k[n]`. Solvers tend to smear one physical event over a few
//! neighbouring offsets, so extraction keeps only the strongest activation
//! within `min_separation` samples per atom (greedy non-maximum
//! suppression), after discarding everything below `threshold` in
//! magnitude.

use crate::codes::Codes;
use lib_types::signal::Signal;
use lib_types::units::Seconds;
use serde::{Deserialize, Serialize};

/// Thresholding and suppression parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Minimum `|amplitude|` kept.
    pub threshold: f64,

    /// Minimum distance in samples between two kept events of one atom.
    ///
    /// Zero or one disables suppression.
    pub min_separation: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            threshold: 1e-3,
            min_separation: 1,
        }
    }
}

impl EventConfig {
    /// Keep every nonzero code.
    pub fn all() -> Self {
        Self {
            threshold: 0.0,
            min_separation: 0,
        }
    }
}

/// One detected atom occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    /// Atom index.
    pub atom: usize,
    /// Sample offset of the atom's first sample.
    pub offset: usize,
    /// Code value.
    pub amplitude: f64,
}

impl Activation {
    /// Start time of the activation within `signal`.
    pub fn time(&self, signal: &Signal) -> Seconds {
        signal.time_at(self.offset)
    }
}

/// Extract activations sorted by offset, then atom.
pub fn extract_activations(codes: &Codes, config: &EventConfig) -> Vec<Activation> {
    let mut events = Vec::new();

    for k in 0..codes.num_atoms() {
        let mut candidates: Vec<Activation> = codes
            .row(k)
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0 && v.abs() >= config.threshold)
            .map(|(offset, &amplitude)| Activation { atom: k, offset, amplitude })
            .collect();

        // Strongest first; ties resolved by earliest offset
        candidates.sort_by(|a, b| {
            b.amplitude
                .abs()
                .total_cmp(&a.amplitude.abs())
                .then(a.offset.cmp(&b.offset))
        });

        let mut kept: Vec<Activation> = Vec::new();
        for candidate in candidates {
            let clear = kept
                .iter()
                .all(|e| e.offset.abs_diff(candidate.offset) >= config.min_separation);
            if clear {
                kept.push(candidate);
            }
        }
        events.extend(kept);
    }

    events.sort_by(|a, b| a.offset.cmp(&b.offset).then(a.atom.cmp(&b.atom)));
    tracing::debug!(
        count = events.len(),
        threshold = config.threshold,
        min_separation = config.min_separation,
        "Activations extracted"
    );
    events
}
