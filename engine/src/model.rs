//! CDF models: trained on the sorted key sequence, they predict the sorted
//! rank of a key.
//!
//! Models never store the keys; the index keeps the permutation elsewhere
//! and only consults the model for a rank prediction plus its own measured
//! maximum error.

use tracing::debug;

/// Keys per segment targeted by [`SegmentedCdfModel`].
const TARGET_SEGMENT_SIZE: usize = 1024;

/// Capability set required of a CDF model.
///
/// `train` consumes the sorted (non-decreasing) key sequence exactly once.
/// `predict` must map any key, present or not, to a rank in `[0, n)`; the
/// prediction error is unconstrained here; the index measures the actual
/// maximum error after training and sizes its search interval from it.
pub trait CdfModel {
    fn train<I>(keys: I) -> Self
    where
        I: ExactSizeIterator<Item = u64>,
        Self: Sized;

    /// Predicted rank for `key`, clamped to `[0, n)`; 0 on an empty model.
    fn predict(&self, key: u64) -> u64;

    /// Self-reported size of the trained model in bytes.
    fn byte_size(&self) -> usize;

    /// Short human-readable model name.
    fn name() -> &'static str
    where
        Self: Sized;
}

/// Endpoint-fit linear model over the full key range.
///
/// Cheapest member of the model family; the prediction error grows with how
/// far the key distribution deviates from uniform.
#[derive(Debug, Clone, Default)]
pub struct LinearCdfModel {
    slope: f64,
    intercept: f64,
    len: u64,
}

impl CdfModel for LinearCdfModel {
    fn train<I>(keys: I) -> Self
    where
        I: ExactSizeIterator<Item = u64>,
    {
        let len = keys.len() as u64;
        let mut first = 0u64;
        let mut last = 0u64;
        for (i, key) in keys.enumerate() {
            if i == 0 {
                first = key;
            }
            last = key;
        }

        if len <= 1 || first == last {
            // 0 or 1 distinct keys: a flat model predicting rank 0 is exact
            // for the lower-bound rank of every stored key.
            return Self {
                slope: 0.0,
                intercept: 0.0,
                len,
            };
        }

        let slope = (len - 1) as f64 / (last - first) as f64;
        let intercept = -(first as f64) * slope;
        Self {
            slope,
            intercept,
            len,
        }
    }

    #[inline]
    fn predict(&self, key: u64) -> u64 {
        if self.len == 0 {
            return 0;
        }
        let predicted = (self.slope * key as f64 + self.intercept).max(0.0) as u64;
        predicted.min(self.len - 1)
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    fn name() -> &'static str {
        "linear"
    }
}

/// Per-segment linear fit over a contiguous rank range.
#[derive(Debug, Clone)]
struct Segment {
    key_min: u64,
    key_max: u64,
    base_rank: u64,
    len: u64,
    slope: f64,
    intercept: f64,
}

impl Segment {
    /// Fits `keys` (non-empty, sorted) covering global ranks starting at
    /// `base_rank`.
    fn fit(keys: &[u64], base_rank: u64) -> Self {
        let key_min = keys[0];
        let key_max = keys[keys.len() - 1];
        let (slope, intercept) = if keys.len() == 1 || key_min == key_max {
            (0.0, 0.0)
        } else {
            let s = (keys.len() - 1) as f64 / (key_max - key_min) as f64;
            (s, -(key_min as f64) * s)
        };
        Self {
            key_min,
            key_max,
            base_rank,
            len: keys.len() as u64,
            slope,
            intercept,
        }
    }

    #[inline]
    fn predict(&self, key: u64) -> u64 {
        let local = (self.slope * key as f64 + self.intercept).max(0.0) as u64;
        self.base_rank + local.min(self.len - 1)
    }
}

/// Piecewise-linear CDF model: fixed-target-size segments routed by key
/// range.
///
/// The default model of the index. Routing binary-searches the segment
/// table; keys falling between or beyond segment ranges route to the nearest
/// segment, so absent keys still yield a usable rank prediction (required by
/// lower-bound lookups).
#[derive(Debug, Clone, Default)]
pub struct SegmentedCdfModel {
    segments: Vec<Segment>,
    len: u64,
}

impl SegmentedCdfModel {
    /// Number of trained segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl CdfModel for SegmentedCdfModel {
    fn train<I>(keys: I) -> Self
    where
        I: ExactSizeIterator<Item = u64>,
    {
        let len = keys.len() as u64;
        if len == 0 {
            return Self::default();
        }

        let mut segments =
            Vec::with_capacity((len as usize + TARGET_SEGMENT_SIZE - 1) / TARGET_SEGMENT_SIZE);
        let mut chunk: Vec<u64> = Vec::with_capacity(TARGET_SEGMENT_SIZE.min(len as usize));
        let mut base_rank = 0u64;
        for key in keys {
            chunk.push(key);
            if chunk.len() == TARGET_SEGMENT_SIZE {
                segments.push(Segment::fit(&chunk, base_rank));
                base_rank += chunk.len() as u64;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            segments.push(Segment::fit(&chunk, base_rank));
        }

        debug!(
            keys = len,
            segments = segments.len(),
            "trained segmented cdf model"
        );
        Self { segments, len }
    }

    fn predict(&self, key: u64) -> u64 {
        if self.segments.is_empty() {
            return 0;
        }

        // First segment whose key range does not end before `key`; keys past
        // the last range route to the last segment.
        let idx = self.segments.partition_point(|seg| seg.key_max < key);
        let seg = &self.segments[idx.min(self.segments.len() - 1)];

        let predicted = if key <= seg.key_min {
            // In a gap before this segment: its base rank is the exact
            // lower-bound rank.
            seg.base_rank
        } else {
            seg.predict(key)
        };
        predicted.min(self.len - 1)
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.segments.len() * std::mem::size_of::<Segment>()
    }

    fn name() -> &'static str {
        "segmented"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train<M: CdfModel>(keys: &[u64]) -> M {
        M::train(keys.iter().copied())
    }

    #[test]
    fn linear_model_uniform_keys() {
        let keys: Vec<u64> = (0..1000u64).map(|i| i * 10).collect();
        let model: LinearCdfModel = train(&keys);

        assert_eq!(model.predict(0), 0);
        assert_eq!(model.predict(9990), 999);
        // Uniform data: predictions land close to the true rank.
        for (rank, &key) in keys.iter().enumerate() {
            assert!(model.predict(key).abs_diff(rank as u64) <= 1);
        }
    }

    #[test]
    fn linear_model_degenerate_cases() {
        let empty: LinearCdfModel = train(&[]);
        assert_eq!(empty.predict(42), 0);

        let single: LinearCdfModel = train(&[7]);
        assert_eq!(single.predict(7), 0);
        assert_eq!(single.predict(1000), 0);

        let identical: LinearCdfModel = train(&[5, 5, 5, 5]);
        assert_eq!(identical.predict(5), 0);
    }

    #[test]
    fn segmented_model_chunks_ranks() {
        let keys: Vec<u64> = (0..10_000u64).map(|i| i * 3).collect();
        let model: SegmentedCdfModel = train(&keys);

        assert_eq!(model.segment_count(), 10);
        for (rank, &key) in keys.iter().enumerate().step_by(97) {
            assert!(model.predict(key).abs_diff(rank as u64) <= 1);
        }
    }

    #[test]
    fn segmented_model_routes_absent_keys() {
        // Two widely separated clusters.
        let mut keys: Vec<u64> = (0..2000u64).collect();
        keys.extend(1_000_000..1_002_000u64);
        let model: SegmentedCdfModel = train(&keys);

        // Below all data.
        assert_eq!(model.predict(0), 0);
        // In the gap: the prediction must stay near the first rank of the
        // upper cluster.
        let gap_pred = model.predict(500_000);
        assert!(gap_pred.abs_diff(2000) <= TARGET_SEGMENT_SIZE as u64);
        // Beyond all data: clamped into range.
        assert!(model.predict(u64::MAX) < keys.len() as u64);
    }

    #[test]
    fn segmented_model_empty_and_tiny() {
        let empty: SegmentedCdfModel = train(&[]);
        assert_eq!(empty.predict(123), 0);
        assert_eq!(empty.segment_count(), 0);

        let tiny: SegmentedCdfModel = train(&[10, 20, 30]);
        assert_eq!(tiny.segment_count(), 1);
        assert_eq!(tiny.predict(10), 0);
        assert_eq!(tiny.predict(30), 2);
    }

    #[test]
    fn predictions_stay_in_range() {
        let keys: Vec<u64> = (0..5000u64).map(|i| i * i).collect();
        let linear: LinearCdfModel = train(&keys);
        let segmented: SegmentedCdfModel = train(&keys);

        for probe in [0, 1, 999, 24_000_000, u64::MAX] {
            assert!(linear.predict(probe) < keys.len() as u64);
            assert!(segmented.predict(probe) < keys.len() as u64);
        }
    }
}
