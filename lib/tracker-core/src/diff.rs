//! Diffing of sorted range sets

use crate::Cidr;
use serde::Serialize;
use std::cmp::Ordering;

/// Ranges to remove and add to move from one range set to another
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RangeDiff {
    /// Present in the previous set only
    pub removed: Vec<Cidr>,
    /// Present in the current set only
    pub added: Vec<Cidr>,
    /// Number of ranges present in both
    pub unchanged: usize,
}

impl RangeDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Drop the ranges common to `prev` and `curr`.
///
/// Both inputs must be sorted ascending and free of duplicates or overlaps;
/// they are not re-sorted. Runs in O(n + m): on a mismatch the side with the
/// smaller end address cannot appear later in the other set, so it is
/// emitted and only that side advances.
pub fn diff(prev: &[Cidr], curr: &[Cidr]) -> RangeDiff {
    let mut result = RangeDiff::default();
    let (mut i, mut j) = (0, 0);

    while i < prev.len() && j < curr.len() {
        match prev[i].cmp(&curr[j]) {
            Ordering::Equal => {
                result.unchanged += 1;
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                result.removed.push(prev[i]);
                i += 1;
            }
            Ordering::Greater => {
                result.added.push(curr[j]);
                j += 1;
            }
        }
    }
    result.removed.extend_from_slice(&prev[i..]);
    result.added.extend_from_slice(&curr[j..]);

    result
}
