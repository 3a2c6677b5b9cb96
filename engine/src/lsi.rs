//! Learned secondary index: build and lookup orchestration.
//!
//! The index accelerates equality and lower-bound lookups over an *unsorted*
//! relation without reordering it. `fit` sorts a permutation of the
//! relation, packs it into a [`PermVector`], trains a CDF model on the
//! sorted key sequence and measures the model's maximum prediction error.
//! Lookups predict a rank, clamp a search interval around it and resolve the
//! key inside that interval, using a fingerprint-filtered linear scan or a
//! bounded binary search.
//!
//! The relation itself is never copied: callers pass the same slice to `fit`
//! and to every lookup, unmodified and in the same order.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tracing::debug;

use crate::config::IndexConfig;
use crate::fingerprint::Fingerprinter;
use crate::key::IndexKey;
use crate::model::{CdfModel, SegmentedCdfModel};
use crate::permvector::PermVector;

/// Secondary index driven by a learned CDF model.
///
/// `K` is the key type of the relation (64-bit unsigned is the reference),
/// `M` the CDF model family trained at `fit` time. The model is
/// monomorphized into the lookup path.
///
/// After `fit` the index is logically immutable and safe for concurrent
/// readers; the two debug counters are relaxed atomics, racy under
/// concurrency, and should be read as approximate telemetry only.
pub struct LearnedSecondaryIndex<K: IndexKey, M: CdfModel = SegmentedCdfModel> {
    config: IndexConfig,
    fingerprinter: Fingerprinter,
    perm: PermVector,
    model: M,
    max_error: u64,
    base_data_accesses: AtomicU64,
    false_positive_accesses: AtomicU64,
    _key: PhantomData<fn(K) -> K>,
}

impl<K: IndexKey, M: CdfModel> Default for LearnedSecondaryIndex<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: IndexKey, M: CdfModel> LearnedSecondaryIndex<K, M> {
    /// Constructs an empty index with the default configuration (no
    /// fingerprints, binary search). Does not allocate.
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
            fingerprinter: Fingerprinter::disabled(),
            perm: PermVector::new(),
            model: M::train(std::iter::empty()),
            max_error: 0,
            base_data_accesses: AtomicU64::new(0),
            false_positive_accesses: AtomicU64::new(0),
            _key: PhantomData,
        }
    }

    /// Constructs an empty index from `config`.
    ///
    /// Fails on an invalid configuration (fingerprint width ≥ 64).
    pub fn with_config(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let fingerprinter = Fingerprinter::new(config.fingerprint_bits)?;
        Ok(Self {
            config,
            fingerprinter,
            ..Self::new()
        })
    }

    /// Builds the index over `keys`, replacing any previous fit and
    /// invalidating outstanding iterators.
    ///
    /// The caller must pass the same slice, unmodified and in the same
    /// order, to every subsequent lookup. O(n log n) time, O(n) auxiliary
    /// memory.
    pub fn fit(&mut self, keys: &[K]) {
        // Sorted view of the relation: order[rank] is the original position
        // of the rank-th smallest key. The buffer starts in insertion order
        // and the sort is stable, so equal keys keep ascending positions.
        let mut order: Vec<u64> = (0..keys.len() as u64).collect();
        order.sort_by_key(|&position| keys[position as usize]);

        self.perm = PermVector::build(
            self.fingerprinter,
            order
                .iter()
                .map(|&position| (position, keys[position as usize].to_word())),
        );

        self.model = M::train(order.iter().map(|&position| keys[position as usize].to_word()));

        // Maximum prediction error, measured against the first rank of each
        // key (its lower-bound rank). This keeps the first occurrence of
        // every key inside the search interval, which lower-bound lookups
        // depend on.
        let mut max_error = 0u64;
        let mut current_lb = 0usize;
        for (rank, &position) in order.iter().enumerate() {
            let key = keys[position as usize];
            if keys[order[current_lb] as usize] != key {
                current_lb = rank;
            }
            let pred = self.model.predict(key.to_word());
            max_error = max_error.max(pred.abs_diff(current_lb as u64));
        }
        self.max_error = max_error;

        debug!(
            len = keys.len(),
            max_error,
            model_bytes = self.model.byte_size(),
            perm_vector_bytes = self.perm.byte_size(),
            "fitted index"
        );
    }

    /// Looks up `key` in the relation `base`, which must be the range the
    /// index was fitted on.
    ///
    /// With `LOWERBOUND = false` the returned iterator dereferences to the
    /// position of the first occurrence of `key` in insertion order, or
    /// equals [`end`](Self::end) if the key is absent. With
    /// `LOWERBOUND = true` it points at the first entry whose key is not
    /// less than `key`, or equals `end` if all keys are smaller.
    ///
    /// Advancing the iterator walks ranks upward: the remaining duplicates
    /// of `key` in insertion order, then strictly greater keys.
    pub fn lookup<const LOWERBOUND: bool>(&self, base: &[K], key: K) -> LookupIter<'_> {
        debug_assert!(base.len() >= self.perm.len());

        let n = self.perm.len();
        if n == 0 {
            return self.end();
        }

        let pred = self.model.predict(key.to_word());
        // Saturating interval around the prediction; pred - min(pred, err)
        // avoids unsigned wrap-around.
        let lo = (pred - pred.min(self.max_error)) as usize;
        let hi = ((pred + self.max_error + 1).min(n as u64)) as usize;

        let rank = if self.config.force_linear_search || self.fingerprinter.is_enabled() {
            self.linear_search::<LOWERBOUND>(base, key, lo, hi)
        } else {
            self.binary_search::<LOWERBOUND>(base, key, lo, hi)
        };

        LookupIter {
            rank,
            perm: &self.perm,
        }
    }

    /// Linear scan over `[lo, hi)`, fingerprint-filtered in equality mode.
    fn linear_search<const LOWERBOUND: bool>(
        &self,
        base: &[K],
        key: K,
        lo: usize,
        hi: usize,
    ) -> usize {
        let key_word = key.to_word();
        let mut rank = lo;

        while rank < hi {
            let entry = self.perm.get(rank);

            // Fingerprint bits fast-track non-hits. Equality mode only: in
            // lower-bound mode a rank whose key differs from `key` still
            // matters for ordering.
            if !LOWERBOUND && !self.perm.test(key_word, &entry) {
                rank += 1;
                continue;
            }

            self.base_data_accesses.fetch_add(1, Ordering::Relaxed);
            if base[entry.position as usize] >= key {
                break;
            }
            self.false_positive_accesses.fetch_add(1, Ordering::Relaxed);
            rank += 1;
        }

        if LOWERBOUND {
            self.complete_lower_bound(base, key, rank)
        } else {
            self.check_equality(base, key, rank)
        }
    }

    /// Lower-bound binary search over `[lo, hi)` through the permutation.
    ///
    /// `false_positive_accesses` is not maintained here; the counter is
    /// linear-scan telemetry only.
    fn binary_search<const LOWERBOUND: bool>(
        &self,
        base: &[K],
        key: K,
        mut lo: usize,
        mut hi: usize,
    ) -> usize {
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            self.base_data_accesses.fetch_add(1, Ordering::Relaxed);
            if base[self.perm.get(mid).position as usize] < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let rank = self.complete_lower_bound(base, key, lo);
        if LOWERBOUND {
            rank
        } else {
            self.check_equality(base, key, rank)
        }
    }

    /// Advances past keys still less than `key`; needed when the bounded
    /// interval stopped short of the true lower bound.
    fn complete_lower_bound(&self, base: &[K], key: K, mut rank: usize) -> usize {
        let n = self.perm.len();
        while rank < n && base[self.perm.get(rank).position as usize] < key {
            self.base_data_accesses.fetch_add(1, Ordering::Relaxed);
            rank += 1;
        }
        rank
    }

    /// Resolves an equality probe: the rank stands only if it holds `key`.
    fn check_equality(&self, base: &[K], key: K, rank: usize) -> usize {
        let n = self.perm.len();
        if rank < n && base[self.perm.get(rank).position as usize] == key {
            rank
        } else {
            n
        }
    }

    /// Iterator at the first rank of the permutation.
    pub fn begin(&self) -> LookupIter<'_> {
        LookupIter {
            rank: 0,
            perm: &self.perm,
        }
    }

    /// Past-the-end iterator; equality lookups return it for absent keys.
    pub fn end(&self) -> LookupIter<'_> {
        LookupIter {
            rank: self.perm.len(),
            perm: &self.perm,
        }
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    /// Largest |predicted rank − first rank| observed at fit time.
    pub fn max_error(&self) -> u64 {
        self.max_error
    }

    /// The trained CDF model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The underlying permutation store.
    pub fn perm_vector(&self) -> &PermVector {
        &self.perm
    }

    /// The configuration the index was constructed with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Base-relation reads performed by lookups so far. Racy debug
    /// telemetry.
    pub fn base_data_accesses(&self) -> u64 {
        self.base_data_accesses.load(Ordering::Relaxed)
    }

    /// Base-relation reads on candidates the search interval included but
    /// that were not the answer. Maintained by the linear scan only; the
    /// binary path leaves it untouched. Racy debug telemetry.
    pub fn false_positive_accesses(&self) -> u64 {
        self.false_positive_accesses.load(Ordering::Relaxed)
    }

    /// Size of the trained model in bytes.
    pub fn model_byte_size(&self) -> usize {
        self.model.byte_size()
    }

    /// Size of the permutation store in bytes.
    pub fn perm_vector_byte_size(&self) -> usize {
        self.perm.byte_size()
    }

    /// Total self-reported index size in bytes.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(&self.max_error) + self.model_byte_size() + self.perm_vector_byte_size()
    }

    /// Human-readable name encoding the model, fingerprint width and search
    /// policy.
    pub fn name(&self) -> String {
        format!(
            "LearnedSecondaryIndex<{}, {}, {}>",
            M::name(),
            self.config.fingerprint_bits,
            self.config.force_linear_search
        )
    }
}

/// Iterator over the permutation returned by lookups.
///
/// Yields offsets into the original relation in rank order. Rank `len()` is
/// the past-the-end state. Iterators borrow the index, so a refit or drop
/// invalidates them at compile time.
#[derive(Debug, Clone)]
pub struct LookupIter<'a> {
    rank: usize,
    perm: &'a PermVector,
}

impl LookupIter<'_> {
    /// Current rank in sorted order.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Position in the original relation at the current rank, without
    /// advancing; `None` past the end.
    pub fn position(&self) -> Option<u64> {
        (self.rank < self.perm.len()).then(|| self.perm.get(self.rank).position)
    }

    /// Whether this iterator is past the end (the "not found" state for
    /// equality lookups).
    pub fn is_end(&self) -> bool {
        self.rank >= self.perm.len()
    }
}

impl Iterator for LookupIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let position = Self::position(self)?;
        self.rank += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.perm.len() - self.rank.min(self.perm.len());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LookupIter<'_> {}

impl PartialEq for LookupIter<'_> {
    /// Rank equality over the same underlying permutation store.
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && std::ptr::eq(self.perm, other.perm)
    }
}

impl Eq for LookupIter<'_> {}
