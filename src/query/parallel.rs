//! Parallel base context: unordered cross-partition draining.
//!
//! Producers are visited in `min_inclusive` order and whole pages are
//! concatenated until the requested page size is reached, so output is
//! deterministic for a given routing snapshot even though no ordering is
//! guaranteed. A single-producer pool degenerates to pass-through.

use std::collections::HashMap;

use uuid::Uuid;

use crate::continuation::codec::CompositeContinuation;
use crate::types::feed::{FeedResponse, QueryMetrics};

use super::component::{DrainFuture, QueryComponent};
use super::errors::QueryResult;
use super::pool::ProducerPool;

/// Base context for queries with no ORDER BY.
pub struct ParallelContext {
    pool: ProducerPool,
    collection_rid: String,
    activity_id: Uuid,
    done: bool,
}

impl ParallelContext {
    pub fn new(pool: ProducerPool, collection_rid: impl Into<String>, activity_id: Uuid) -> Self {
        Self {
            pool,
            collection_rid: collection_rid.into(),
            activity_id,
            done: false,
        }
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }
        if !self.pool.fill_any().await? {
            self.done = true;
            return Ok(None);
        }

        let mut items = Vec::new();
        let mut request_charge = 0.0;
        let mut query_metrics: HashMap<String, QueryMetrics> = HashMap::new();

        // Round-robin over producers with buffered data, a whole page at
        // a time. No awaits in here: the producer set cannot change.
        let range_ids = self.pool.range_ids();
        let mut progressed = true;
        'assemble: while items.len() < max_page_size && progressed {
            progressed = false;
            for range_id in &range_ids {
                if items.len() >= max_page_size {
                    break 'assemble;
                }
                if let Some(page) = self.pool.pop_page_for(range_id) {
                    progressed = true;
                    request_charge += page.request_charge;
                    QueryMetrics::merge_map(&mut query_metrics, &page.query_metrics);
                    items.extend(page.items);
                }
            }
        }

        // Keep the look-ahead warm while the consumer processes this page.
        self.pool.schedule_fetches(None);

        let ranges = self.pool.parallel_resume_ranges();
        let continuation = if ranges.is_empty() {
            self.done = true;
            None
        } else {
            Some(CompositeContinuation::new(self.collection_rid.clone(), ranges))
        };

        Ok(Some(FeedResponse {
            items,
            continuation,
            request_charge,
            query_metrics,
            activity_id: self.activity_id,
        }))
    }
}

impl QueryComponent for ParallelContext {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}
