//! Composite continuation token codec.
//!
//! Tokens are opaque to consumers but structured internally: a versioned
//! JSON document carrying one entry per partition key range still holding
//! data, plus the outer components' counters. A token emitted against one
//! routing snapshot must resume correctly against a later snapshot, so
//! resume matches persisted range bounds against the current map and
//! handles splits by fanning a persisted token out to the child ranges.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::routing::range::{PartitionKeyRange, RangeRelation};

/// Current token format version.
pub const CONTINUATION_VERSION: u32 = 1;

/// Failures parsing or resuming a continuation token. All fatal.
#[derive(Debug, Clone, Error)]
pub enum ContinuationError {
    #[error("malformed continuation token: {0}")]
    Malformed(String),

    #[error("unsupported continuation version {0}")]
    UnsupportedVersion(u32),

    #[error("continuation was issued for collection {token_rid}, not {collection_rid}")]
    CollectionMismatch {
        token_rid: String,
        collection_rid: String,
    },

    #[error("continuation range [{min},{max}) was merged; the token cannot be resumed")]
    RangeMerged { min: String, max: String },

    #[error("continuation range [{min},{max}) matches no range in the routing map")]
    RangeNotFound { min: String, max: String },
}

/// ORDER BY resume state: the last emitted item's sort keys and rid.
///
/// Undefined key cells are stored as JSON `null`; the resume filter falls
/// back to a full replay for those columns and the merge's client-side
/// skip keeps the output exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByState {
    pub keys: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
}

/// Per-range entry of a composite continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeContinuation {
    pub min: String,
    pub max: String,
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderByState>,
}

/// State of the outer pipeline components at the emitted page boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OuterState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_remaining: Option<u64>,
    /// Hex-encoded 64-bit fingerprints of items already emitted by an
    /// unordered DISTINCT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_state: Option<Vec<String>>,
}

impl OuterState {
    pub fn is_empty(&self) -> bool {
        self.limit_remaining.is_none()
            && self.top_remaining.is_none()
            && self.skip_remaining.is_none()
            && self.distinct_state.is_none()
    }
}

/// Seed for one producer created on resume.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeSeed {
    pub token: Option<String>,
    pub order: Option<OrderByState>,
}

/// The cross-partition cursor serialized at every page boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeContinuation {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "rid")]
    pub collection_rid: String,
    pub ranges: Vec<RangeContinuation>,
    #[serde(default, skip_serializing_if = "OuterState::is_empty")]
    pub outer: OuterState,
}

impl CompositeContinuation {
    pub fn new(collection_rid: impl Into<String>, ranges: Vec<RangeContinuation>) -> Self {
        Self {
            version: CONTINUATION_VERSION,
            collection_rid: collection_rid.into(),
            ranges,
            outer: OuterState::default(),
        }
    }

    /// Serializes to the opaque wire form.
    pub fn to_token(&self) -> String {
        serde_json::to_string(self).expect("continuation token serializes to JSON")
    }

    /// Parses a wire token and checks version and collection identity.
    pub fn from_token(token: &str, collection_rid: &str) -> Result<Self, ContinuationError> {
        let parsed: CompositeContinuation =
            serde_json::from_str(token).map_err(|e| ContinuationError::Malformed(e.to_string()))?;
        if parsed.version > CONTINUATION_VERSION {
            return Err(ContinuationError::UnsupportedVersion(parsed.version));
        }
        if parsed.collection_rid != collection_rid {
            return Err(ContinuationError::CollectionMismatch {
                token_rid: parsed.collection_rid,
                collection_rid: collection_rid.to_string(),
            });
        }
        if parsed.ranges.is_empty() {
            return Err(ContinuationError::Malformed(
                "continuation holds no ranges".to_string(),
            ));
        }
        Ok(parsed)
    }

    /// Matches persisted ranges against the current routing snapshot and
    /// returns the producers to create, sorted by `min_inclusive`.
    ///
    /// - Exact match: the current range is seeded with the entry's token.
    /// - Split: every current child overlapping the persisted entry is
    ///   seeded with the same token; the per-range feed replays from that
    ///   position and each child's own range filter narrows it.
    /// - Merge: resuming is impossible, the token is rejected.
    ///
    /// Ranges absent from the token were already drained and are not
    /// queried again.
    pub fn seed_producers(
        &self,
        current_ranges: &[PartitionKeyRange],
    ) -> Result<Vec<(PartitionKeyRange, RangeSeed)>, ContinuationError> {
        let mut seeded: Vec<(PartitionKeyRange, RangeSeed)> = Vec::new();

        for entry in &self.ranges {
            let mut matched_any = false;
            for range in current_ranges {
                match range.relation_to(&entry.min, &entry.max) {
                    RangeRelation::Exact | RangeRelation::CurrentIsChild => {
                        matched_any = true;
                        seeded.push((
                            range.clone(),
                            RangeSeed {
                                token: entry.token.clone(),
                                order: entry.order.clone(),
                            },
                        ));
                    }
                    RangeRelation::CurrentIsParent | RangeRelation::Overlapping => {
                        return Err(ContinuationError::RangeMerged {
                            min: entry.min.clone(),
                            max: entry.max.clone(),
                        });
                    }
                    RangeRelation::Disjoint => {}
                }
            }
            if !matched_any {
                return Err(ContinuationError::RangeNotFound {
                    min: entry.min.clone(),
                    max: entry.max.clone(),
                });
            }
        }

        seeded.sort_by(|a, b| a.0.min_inclusive.cmp(&b.0.min_inclusive));
        Ok(seeded)
    }
}
