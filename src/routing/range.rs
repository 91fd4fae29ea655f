//! Half-open key ranges over the hashed partition key space.
//!
//! A [`PartitionKeyRange`] is always `[min, max)` and is owned by exactly
//! one physical partition. A [`QueryRange`] carries explicit inclusivity
//! because query plans can target closed or open intervals.

use serde::{Deserialize, Serialize};

/// Smallest value of the hashed key space.
pub const RANGE_MIN: &str = "";

/// Largest value of the hashed key space (exclusive).
pub const RANGE_MAX: &str = "FF";

/// A key interval from a query plan, with explicit endpoint inclusivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRange {
    pub min: String,
    pub max: String,
    #[serde(rename = "isMinInclusive")]
    pub is_min_inclusive: bool,
    #[serde(rename = "isMaxInclusive")]
    pub is_max_inclusive: bool,
}

impl QueryRange {
    pub fn new(min: impl Into<String>, max: impl Into<String>, min_inclusive: bool, max_inclusive: bool) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            is_min_inclusive: min_inclusive,
            is_max_inclusive: max_inclusive,
        }
    }

    /// The whole key space.
    pub fn full() -> Self {
        Self::new(RANGE_MIN, RANGE_MAX, true, false)
    }
}

/// How a persisted continuation range relates to a range in the current
/// routing snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRelation {
    /// Identical bounds.
    Exact,
    /// The current range is contained in the persisted one: the persisted
    /// range has split since the token was issued.
    CurrentIsChild,
    /// The current range strictly covers the persisted one: the persisted
    /// range was merged away.
    CurrentIsParent,
    /// No overlap.
    Disjoint,
    /// Partial overlap that is neither containment direction.
    Overlapping,
}

/// One partition's owned key range, snapshotted from the routing map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    pub id: String,
    #[serde(rename = "minInclusive")]
    pub min_inclusive: String,
    #[serde(rename = "maxExclusive")]
    pub max_exclusive: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    pub fn new(id: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min.into(),
            max_exclusive: max.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    /// True when `point` falls inside `[min, max)`.
    pub fn contains(&self, point: &str) -> bool {
        self.min_inclusive.as_str() <= point && point < self.max_exclusive.as_str()
    }

    /// True when this range and a plan range share at least one point.
    pub fn overlaps(&self, query_range: &QueryRange) -> bool {
        // Range ends before the query starts.
        if self.max_exclusive < query_range.min {
            return false;
        }
        if self.max_exclusive == query_range.min {
            return false;
        }
        // Query ends before the range starts.
        if query_range.max < self.min_inclusive {
            return false;
        }
        if query_range.max == self.min_inclusive && !query_range.is_max_inclusive {
            return false;
        }
        true
    }

    /// Classifies this range against persisted continuation bounds.
    pub fn relation_to(&self, persisted_min: &str, persisted_max: &str) -> RangeRelation {
        let (cur_min, cur_max) = (self.min_inclusive.as_str(), self.max_exclusive.as_str());
        if cur_min == persisted_min && cur_max == persisted_max {
            return RangeRelation::Exact;
        }
        if cur_max <= persisted_min || persisted_max <= cur_min {
            return RangeRelation::Disjoint;
        }
        if persisted_min <= cur_min && cur_max <= persisted_max {
            return RangeRelation::CurrentIsChild;
        }
        if cur_min <= persisted_min && persisted_max <= cur_max {
            return RangeRelation::CurrentIsParent;
        }
        RangeRelation::Overlapping
    }
}

/// Keeps only the ranges overlapping at least one plan range, preserving
/// `min_inclusive` order. Empty `query_ranges` keeps everything.
pub fn select_overlapping(ranges: &mut Vec<PartitionKeyRange>, query_ranges: &[QueryRange]) {
    if query_ranges.is_empty() {
        return;
    }
    ranges.retain(|range| query_ranges.iter().any(|qr| range.overlaps(qr)));
}
