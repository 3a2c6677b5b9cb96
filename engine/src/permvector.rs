//! Packed permutation store: rank → (original position, fingerprint bits).
//!
//! Both lanes share a single byte buffer laid out as
//! `[offsets lane][fingerprint lane][slop]`, each lane bit-packed at the
//! minimum width able to represent its values. The fingerprint lane exists
//! only when the fingerprinter is enabled.

use tracing::debug;

use crate::bitpack::{max_bit_width, pack_into, put_slop, BitPackedReader};
use crate::fingerprint::Fingerprinter;

/// Entry stored at one rank of the permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermEntry {
    /// Offset into the original, unsorted relation.
    pub position: u64,
    /// Fingerprint of the key at `position`; 0 when the lane is disabled.
    pub fingerprint_bits: u64,
}

/// Bit-packed permutation vector with an optional fingerprint lane.
#[derive(Debug, Default)]
pub struct PermVector {
    len: usize,
    data: Vec<u8>,
    offsets: BitPackedReader,
    fingerprints: Option<BitPackedReader>,
    fingerprinter: Fingerprinter,
}

impl PermVector {
    /// Empty permutation vector with no backing storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from `(position, key_word)` pairs in sorted-by-key
    /// order; fingerprints are derived from the key words.
    pub fn build<I>(fingerprinter: Fingerprinter, sorted: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let mut offsets = Vec::new();
        let mut prints = Vec::new();
        for (position, key_word) in sorted {
            offsets.push(position);
            if fingerprinter.is_enabled() {
                prints.push(fingerprinter.fingerprint(key_word));
            }
        }
        let len = offsets.len();

        let mut data = Vec::new();
        let offsets_width = max_bit_width(&offsets);
        pack_into(&offsets, offsets_width, &mut data);

        let fingerprints = if fingerprinter.is_enabled() {
            let width = max_bit_width(&prints);
            let base = data.len();
            pack_into(&prints, width, &mut data);
            Some(BitPackedReader::new(base, width))
        } else {
            None
        };
        put_slop(&mut data);

        debug!(
            len,
            offsets_width,
            fingerprint_width = fingerprints.map_or(0, |r| r.width()),
            bytes = data.len(),
            "built permutation vector"
        );

        Self {
            len,
            data,
            offsets: BitPackedReader::new(0, offsets_width),
            fingerprints,
            fingerprinter,
        }
    }

    /// Entry at `rank`. Ranks at or past [`len`](Self::len) are a caller
    /// contract violation.
    #[inline]
    pub fn get(&self, rank: usize) -> PermEntry {
        debug_assert!(rank < self.len);
        let position = self.offsets.get(&self.data, rank);
        let fingerprint_bits = match &self.fingerprints {
            Some(reader) => reader.get(&self.data, rank),
            None => 0,
        };
        PermEntry {
            position,
            fingerprint_bits,
        }
    }

    /// Whether `key_word` can match the fingerprint stored in `entry`.
    #[inline]
    pub fn test(&self, key_word: u64, entry: &PermEntry) -> bool {
        self.fingerprinter.test(key_word, entry.fingerprint_bits)
    }

    /// Number of stored ranks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The fingerprinter the store was built with.
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Total memory occupied by this store in bytes.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.data.len()
    }

    /// Rank-ordered iterator over the stored entries.
    pub fn iter(&self) -> PermVectorIter<'_> {
        PermVectorIter {
            vector: self,
            rank: 0,
        }
    }
}

impl PartialEq for PermVector {
    /// Byte-exact buffer equality plus length equality.
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.data == other.data
    }
}

impl Eq for PermVector {}

impl<'a> IntoIterator for &'a PermVector {
    type Item = PermEntry;
    type IntoIter = PermVectorIter<'a>;

    fn into_iter(self) -> PermVectorIter<'a> {
        self.iter()
    }
}

/// Iterator over `(position, fingerprint_bits)` entries in rank order.
#[derive(Debug, Clone)]
pub struct PermVectorIter<'a> {
    vector: &'a PermVector,
    rank: usize,
}

impl Iterator for PermVectorIter<'_> {
    type Item = PermEntry;

    fn next(&mut self) -> Option<PermEntry> {
        if self.rank >= self.vector.len {
            return None;
        }
        let entry = self.vector.get(self.rank);
        self.rank += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len - self.rank;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PermVectorIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_from_pairs(bits: u8, pairs: &[(u64, u64)]) -> PermVector {
        PermVector::build(
            Fingerprinter::new(bits).unwrap(),
            pairs.iter().copied(),
        )
    }

    #[test]
    fn empty_store() {
        let pv = build_from_pairs(8, &[]);
        assert_eq!(pv.len(), 0);
        assert!(pv.is_empty());
        assert_eq!(pv.iter().count(), 0);
    }

    #[test]
    fn positions_roundtrip() {
        let pairs: Vec<(u64, u64)> = (0..1000u64).map(|i| (999 - i, i * 7)).collect();
        let pv = build_from_pairs(0, &pairs);

        assert_eq!(pv.len(), pairs.len());
        for (rank, &(position, _)) in pairs.iter().enumerate() {
            assert_eq!(pv.get(rank).position, position);
            // Lane disabled: no fingerprint bits stored.
            assert_eq!(pv.get(rank).fingerprint_bits, 0);
        }
    }

    #[test]
    fn fingerprint_lane_matches_keys() {
        let fingerprinter = Fingerprinter::new(12).unwrap();
        let pairs: Vec<(u64, u64)> = (0..500u64).map(|i| (i, i.wrapping_mul(31))).collect();
        let pv = PermVector::build(fingerprinter, pairs.iter().copied());

        for (rank, &(_, key_word)) in pairs.iter().enumerate() {
            let entry = pv.get(rank);
            assert_eq!(entry.fingerprint_bits, fingerprinter.fingerprint(key_word));
            assert!(pv.test(key_word, &entry));
        }
    }

    #[test]
    fn iterator_agrees_with_random_access() {
        let pairs: Vec<(u64, u64)> = (0..300u64).map(|i| (i * 3, i)).collect();
        let pv = build_from_pairs(4, &pairs);

        assert_eq!(pv.iter().len(), pv.len());
        for (rank, entry) in pv.iter().enumerate() {
            assert_eq!(entry, pv.get(rank));
        }
    }

    #[test]
    fn equality_is_byte_exact() {
        let pairs: Vec<(u64, u64)> = (0..100u64).map(|i| (i, i * i)).collect();
        let a = build_from_pairs(8, &pairs);
        let b = build_from_pairs(8, &pairs);
        assert_eq!(a, b);

        let mut different = pairs.clone();
        different[50].0 = 1234;
        let c = build_from_pairs(8, &different);
        assert_ne!(a, c);
    }
}
