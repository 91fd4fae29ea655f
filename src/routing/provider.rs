//! Routing-map collaborator boundary.
//!
//! The provider hands out immutable snapshots of the partition key range
//! map. Readers never observe a half-applied split; a refreshed snapshot
//! is obtained through [`RoutingMapProvider::try_resolve_children`] after
//! a range-gone failure.

use std::future::Future;
use std::pin::Pin;

use crate::transport::errors::TransportResult;

use super::range::{PartitionKeyRange, QueryRange};

/// Future type returned by routing lookups.
pub type RoutingFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Resolves partition key ranges for a collection.
pub trait RoutingMapProvider: Send + Sync {
    /// Returns the ranges overlapping `target`, sorted by `min_inclusive`.
    fn resolve_ranges<'a>(
        &'a self,
        collection_rid: &'a str,
        target: &'a QueryRange,
    ) -> RoutingFuture<'a, Vec<PartitionKeyRange>>;

    /// Returns the child ranges of a split range, or an empty vector when
    /// the range is still current.
    fn try_resolve_children<'a>(
        &'a self,
        collection_rid: &'a str,
        range_id: &'a str,
    ) -> RoutingFuture<'a, Vec<PartitionKeyRange>>;
}
