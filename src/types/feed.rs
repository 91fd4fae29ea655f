//! Feed options, feed responses, and per-partition query metrics.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::continuation::CompositeContinuation;

/// Page size used when [`FeedOptions::max_item_count`] is unset.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Buffered-item budget used when [`FeedOptions::max_buffered_item_count`]
/// is unset.
pub const DEFAULT_MAX_BUFFERED_ITEM_COUNT: usize = 1000;

/// Per-query request options.
///
/// Immutable for the lifetime of one query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedOptions {
    /// Maximum number of items per emitted page.
    pub max_item_count: Option<usize>,
    /// Continuation token from a previous execution to resume from.
    pub request_continuation: Option<String>,
    /// Maximum number of partitions fetched concurrently.
    /// `-1` sizes automatically; `0` or `1` fetch serially.
    pub max_degree_of_parallelism: i32,
    /// Upper bound on items buffered across all partition producers.
    pub max_buffered_item_count: Option<usize>,
    /// Whether the query may fan out across partitions.
    pub enable_cross_partition_query: bool,
}

impl FeedOptions {
    pub fn new() -> Self {
        Self {
            max_item_count: None,
            request_continuation: None,
            max_degree_of_parallelism: -1,
            max_buffered_item_count: None,
            enable_cross_partition_query: false,
        }
    }

    pub fn with_max_item_count(mut self, count: usize) -> Self {
        self.max_item_count = Some(count);
        self
    }

    pub fn with_continuation(mut self, token: impl Into<String>) -> Self {
        self.request_continuation = Some(token.into());
        self
    }

    pub fn with_max_degree_of_parallelism(mut self, degree: i32) -> Self {
        self.max_degree_of_parallelism = degree;
        self
    }

    pub fn with_max_buffered_item_count(mut self, count: usize) -> Self {
        self.max_buffered_item_count = Some(count);
        self
    }

    pub fn cross_partition(mut self) -> Self {
        self.enable_cross_partition_query = true;
        self
    }

    /// Effective page size.
    pub fn page_size(&self) -> usize {
        match self.max_item_count {
            Some(n) if n > 0 => n,
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Effective buffered-item budget.
    pub fn buffered_item_budget(&self) -> usize {
        match self.max_buffered_item_count {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_BUFFERED_ITEM_COUNT,
        }
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-side execution statistics for one partition's share of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub retrieved_document_count: u64,
    pub retrieved_document_size_bytes: u64,
    pub output_document_count: u64,
    pub total_query_execution_time: Duration,
}

impl QueryMetrics {
    /// Folds another metrics sample into this one.
    pub fn add(&mut self, other: &QueryMetrics) {
        self.retrieved_document_count += other.retrieved_document_count;
        self.retrieved_document_size_bytes += other.retrieved_document_size_bytes;
        self.output_document_count += other.output_document_count;
        self.total_query_execution_time += other.total_query_execution_time;
    }

    /// Merges a per-partition metrics map into `into`, adding samples for
    /// partitions already present.
    pub fn merge_map(into: &mut HashMap<String, QueryMetrics>, from: &HashMap<String, QueryMetrics>) {
        for (range_id, metrics) in from {
            into.entry(range_id.clone()).or_default().add(metrics);
        }
    }
}

/// One page of query results surfaced to the consumer.
#[derive(Debug, Clone)]
pub struct FeedResponse {
    /// The documents in this page.
    pub items: Vec<Value>,
    /// Cursor resuming the query after this page; `None` on the final page.
    pub continuation: Option<CompositeContinuation>,
    /// Request charge accumulated across the partitions that fed this page.
    pub request_charge: f64,
    /// Query metrics keyed by partition key range id.
    pub query_metrics: HashMap<String, QueryMetrics>,
    /// Correlates every request this query issued.
    pub activity_id: Uuid,
}

impl FeedResponse {
    /// The continuation serialized to its opaque wire form.
    pub fn continuation_token(&self) -> Option<String> {
        self.continuation.as_ref().map(CompositeContinuation::to_token)
    }

    /// Deserializes the page's items into a typed collection.
    pub fn deserialize_items<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<Vec<T>> {
        self.items
            .iter()
            .map(|item| serde_json::from_value(item.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_defaults() {
        assert_eq!(FeedOptions::new().page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(FeedOptions::new().with_max_item_count(7).page_size(), 7);
    }

    #[test]
    fn test_buffered_budget_defaults() {
        assert_eq!(
            FeedOptions::new().buffered_item_budget(),
            DEFAULT_MAX_BUFFERED_ITEM_COUNT
        );
        assert_eq!(
            FeedOptions::new()
                .with_max_buffered_item_count(64)
                .buffered_item_budget(),
            64
        );
    }

    #[test]
    fn test_metrics_merge() {
        let mut into = HashMap::new();
        into.insert(
            "0".to_string(),
            QueryMetrics {
                retrieved_document_count: 2,
                ..Default::default()
            },
        );

        let mut from = HashMap::new();
        from.insert(
            "0".to_string(),
            QueryMetrics {
                retrieved_document_count: 3,
                ..Default::default()
            },
        );
        from.insert(
            "1".to_string(),
            QueryMetrics {
                retrieved_document_count: 5,
                ..Default::default()
            },
        );

        QueryMetrics::merge_map(&mut into, &from);
        assert_eq!(into["0"].retrieved_document_count, 5);
        assert_eq!(into["1"].retrieved_document_count, 5);
    }
}
