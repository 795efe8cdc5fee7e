//! Index lists, the all-indices sentinel, and reverse index lookup.
//!
//! Assign and extract take user index lists. Two encodings are special:
//!
//! - the empty list means "no indices";
//! - a single-element list `[-n]` is the canonical in-memory encoding of the
//!   marker "all indices of length n", produced by [`all`].
//!
//! [`Region`] is the parsed form consumers dispatch on, with the sorted
//! `(index, position)` table ([`IntSearcher`]) that reverse lookups and
//! membership tests walk.

use crate::error::{Error, Result};
use std::sync::Arc;

/// Coordinate type for vectors and matrices.
///
/// Signed so that the two sentinel encodings (the `[-n]` all-marker and the
/// sign bit on delta-chain coordinates) have room; handle-level validation
/// rejects negative coordinates everywhere else.
pub type Ix = i64;

/// The canonical encoding of "all indices from 0 to n−1 in order".
///
/// `all(0)` returns the empty list, which already means "no indices" (−0 is
/// not representable).
pub fn all(n: Ix) -> Vec<Ix> {
    if n <= 0 { Vec::new() } else { vec![-n] }
}

/// Sorted `(index, position)` pairs over an index list, for reverse lookup.
///
/// `positions_of(i)` answers "which output/source positions refer to index
/// i?" in O(log n + hits); extract uses it to remap a source stream into the
/// output coordinate system, assign uses it for region membership.
#[derive(Debug)]
pub(crate) struct IntSearcher {
    pairs: Vec<(Ix, usize)>,
}

impl IntSearcher {
    pub(crate) fn new(list: &[Ix]) -> Self {
        let mut pairs: Vec<(Ix, usize)> = list.iter().copied().zip(0..).collect();
        pairs.sort_unstable();
        IntSearcher { pairs }
    }

    /// All positions `p` with `list[p] == i`, ascending.
    pub(crate) fn positions_of(&self, i: Ix) -> &[(Ix, usize)] {
        let lo = self.pairs.partition_point(|&(k, _)| k < i);
        let hi = self.pairs.partition_point(|&(k, _)| k <= i);
        &self.pairs[lo..hi]
    }

    /// First position with `list[p] == i`, if any.
    pub(crate) fn position_of(&self, i: Ix) -> Option<usize> {
        self.positions_of(i).first().map(|&(_, p)| p)
    }
}

/// A parsed index region: either the full `[0, n)` range or an explicit list.
#[derive(Clone, Debug)]
pub(crate) enum Region {
    /// All indices `0..n` in order.
    All(Ix),
    /// An explicit list, possibly unsorted, with its reverse-lookup table.
    List {
        list: Arc<Vec<Ix>>,
        searcher: Arc<IntSearcher>,
        /// Strictly increasing lists keep remapped streams monotone and skip
        /// the collect-then-sort pass.
        monotone: bool,
    },
}

impl Region {
    /// Parse a user index list against an exclusive bound.
    ///
    /// Rejects stray negative entries (anything negative that is not the
    /// single-element sentinel) with `InvalidIndex` and out-of-range entries
    /// with `IndexOutOfBounds`.
    pub(crate) fn parse(list: &[Ix], bound: Ix) -> Result<Region> {
        if list.len() == 1 && list[0] < 0 {
            let n = -list[0];
            if n > bound {
                return Err(Error::IndexOutOfBounds { index: n - 1, bound });
            }
            return Ok(Region::All(n));
        }
        for &i in list {
            if i < 0 {
                return Err(Error::InvalidIndex);
            }
            if i >= bound {
                return Err(Error::IndexOutOfBounds { index: i, bound });
            }
        }
        let monotone = list.windows(2).all(|w| w[0] < w[1]);
        Ok(Region::List {
            searcher: Arc::new(IntSearcher::new(list)),
            list: Arc::new(list.to_vec()),
            monotone,
        })
    }

    /// Number of indices the region names.
    pub(crate) fn len(&self) -> Ix {
        match self {
            Region::All(n) => *n,
            Region::List { list, .. } => list.len() as Ix,
        }
    }

    /// Whether this is the full-range sentinel.
    pub(crate) fn is_all(&self) -> bool {
        matches!(self, Region::All(_))
    }

    /// Remapped streams stay in key order without a sort pass.
    pub(crate) fn monotone(&self) -> bool {
        match self {
            Region::All(_) => true,
            Region::List { monotone, .. } => *monotone,
        }
    }

    /// Output/target index for source position `k`.
    pub(crate) fn map(&self, k: Ix) -> Ix {
        match self {
            Region::All(_) => k,
            Region::List { list, .. } => list[k as usize],
        }
    }

    /// Source position for target index `i`, if `i` lies inside the region.
    ///
    /// For lists with repeats the first occurrence wins.
    pub(crate) fn position(&self, i: Ix) -> Option<Ix> {
        match self {
            Region::All(n) => (i >= 0 && i < *n).then_some(i),
            Region::List { searcher, .. } => searcher.position_of(i).map(|p| p as Ix),
        }
    }

    /// Membership test without the position.
    pub(crate) fn contains(&self, i: Ix) -> bool {
        self.position(i).is_some()
    }

    /// All positions mapping to target index `i`, ascending (lists may carry
    /// repeats).
    pub(crate) fn positions_of(&self, i: Ix) -> Vec<Ix> {
        match self {
            Region::All(n) => {
                if i >= 0 && i < *n {
                    vec![i]
                } else {
                    Vec::new()
                }
            }
            Region::List { searcher, .. } => searcher
                .positions_of(i)
                .iter()
                .map(|&(_, p)| p as Ix)
                .collect(),
        }
    }

    /// The target indices named by the region, ascending and duplicate-free.
    pub(crate) fn sorted_targets(&self) -> Vec<Ix> {
        match self {
            Region::All(n) => (0..*n).collect(),
            Region::List { list, .. } => {
                let mut t: Vec<Ix> = list.as_ref().clone();
                t.sort_unstable();
                t.dedup();
                t
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_roundtrip() {
        assert_eq!(all(4), vec![-4]);
        assert!(all(0).is_empty());
        let r = Region::parse(&all(4), 10).unwrap();
        assert!(r.is_all());
        assert_eq!(r.len(), 4);
        assert_eq!(r.position(3), Some(3));
        assert_eq!(r.position(4), None);
    }

    #[test]
    fn list_region_lookup() {
        let r = Region::parse(&[5, 1, 7], 10).unwrap();
        assert!(!r.monotone());
        assert_eq!(r.len(), 3);
        assert_eq!(r.map(0), 5);
        assert_eq!(r.position(7), Some(2));
        assert_eq!(r.position(2), None);
    }

    #[test]
    fn rejects_bad_lists() {
        assert!(matches!(Region::parse(&[1, -2], 10), Err(Error::InvalidIndex)));
        assert!(matches!(
            Region::parse(&[11], 10),
            Err(Error::IndexOutOfBounds { index: 11, bound: 10 })
        ));
    }

    #[test]
    fn searcher_finds_repeats() {
        let s = IntSearcher::new(&[4, 2, 4, 9]);
        let hits: Vec<usize> = s.positions_of(4).iter().map(|&(_, p)| p).collect();
        assert_eq!(hits, vec![0, 2]);
    }
}
