//! Scan intervals over the raw QuadKey domain.

use serde::{Deserialize, Serialize};

use crate::quadkey::QuadKey;

/// A closed interval of raw QuadKey values.
///
/// Endpoints are not, in general, valid QuadKeys themselves; the range
/// is a scan predicate over the raw 64-bit domain. Produce one with
/// [`QuadKey::range`] or [`QuadKey::single_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadKeyRange {
    pub start: u64,
    pub end: u64,
}

impl QuadKeyRange {
    /// Create a range from raw endpoints.
    pub fn new(start: u64, end: u64) -> QuadKeyRange {
        QuadKeyRange { start, end }
    }

    /// Whether `key`'s raw value falls inside the interval.
    pub fn contains(self, key: QuadKey) -> bool {
        self.start <= key.raw() && key.raw() <= self.end
    }

    /// Merge with another range when they overlap or are adjacent.
    ///
    /// Adjacency means `end + 1 == other.start` (or vice versa), with the
    /// addition guarded against overflow at `u64::MAX`.
    pub fn merge(self, other: QuadKeyRange) -> Option<QuadKeyRange> {
        let (lo, hi) = if self.start <= other.start { (self, other) } else { (other, self) };
        if lo.end >= hi.start || (lo.end != u64::MAX && lo.end + 1 == hi.start) {
            Some(QuadKeyRange {
                start: lo.start,
                end: lo.end.max(hi.end),
            })
        } else {
            None
        }
    }
}
