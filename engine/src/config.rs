// engine/src/config.rs
//
// Index configuration.
//
// Two knobs control the lookup policy:
// - fingerprint_bits: width of the per-rank fingerprint lane (0 disables it)
// - force_linear_search: use the linear scan even without fingerprints
//
// Design principles:
// - Sensible defaults (works out of the box: no fingerprints, binary search)
// - Clear validation errors at construction, never at lookup time

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::fingerprint::MAX_FINGERPRINT_BITS;

/// Tunable parameters of a
/// [`LearnedSecondaryIndex`](crate::LearnedSecondaryIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Fingerprint bits stored per rank; 0 disables the fingerprint lane.
    pub fingerprint_bits: u8,

    /// Force the linear search policy even when no fingerprints are stored.
    pub force_linear_search: bool,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fingerprint width in bits.
    pub fn with_fingerprint_bits(mut self, bits: u8) -> Self {
        self.fingerprint_bits = bits;
        self
    }

    /// Forces the linear search policy regardless of fingerprint width.
    pub fn with_forced_linear_search(mut self, force: bool) -> Self {
        self.force_linear_search = force;
        self
    }

    /// Checks the configuration before an index is constructed from it.
    pub fn validate(&self) -> Result<()> {
        if self.fingerprint_bits > MAX_FINGERPRINT_BITS {
            bail!(
                "fingerprint_bits = {} exceeds the supported maximum of {}",
                self.fingerprint_bits,
                MAX_FINGERPRINT_BITS
            );
        }
        Ok(())
    }
}
