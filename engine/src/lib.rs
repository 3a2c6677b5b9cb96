//! Learned secondary index over unsorted relations.
//!
//! Accelerates equality and lower-bound lookups over an unsorted key array
//! without reordering it: a learned CDF model predicts the sorted rank of a
//! key, a bit-packed permutation maps ranks back to original positions, and
//! optional per-rank fingerprints let equality probes skip base-data reads
//! on mismatches.
//!
//! Key properties:
//! - Read-only after a single `fit`; the relation itself is never copied
//! - Bounded search: a lookup probes at most `2 * max_error + 1` ranks plus
//!   the duplicates of the queried key
//! - No allocation on the lookup path

// ===== Core modules =====

// Fixed-width bit packing (shared lane codec)
pub mod bitpack;

// Key fingerprints for equality fast-tracking
pub mod fingerprint;

// Key abstraction (unsigned integer keys)
pub mod key;

// Packed rank → position permutation store
pub mod permvector;

// CDF model family (linear + segmented)
pub mod model;

// Index configuration
pub mod config;

// Build + lookup orchestration
pub mod lsi;

// ===== Public API =====

// Bit-packing components
pub use bitpack::{max_bit_width, BitPackedReader, SLOP_BYTES};

// Fingerprint components
pub use fingerprint::{Fingerprinter, MAX_FINGERPRINT_BITS};

// Key abstraction
pub use key::IndexKey;

// Permutation store components
pub use permvector::{PermEntry, PermVector, PermVectorIter};

// CDF model components
pub use model::{CdfModel, LinearCdfModel, SegmentedCdfModel};

// Index configuration
pub use config::IndexConfig;

// Index core
pub use lsi::{LearnedSecondaryIndex, LookupIter};
