//! Producer pool: owns the per-range producers and drives their fetches.
//!
//! Both base contexts embed a pool. Producers are owned exclusively here;
//! fetch futures are tagged with the range id they serve, driven through
//! a single `FuturesUnordered`, and their results applied back to the
//! owning producer. Split replacement is an in-place swap of one producer
//! for its children, so the invariant that active producer ranges
//! partition the query range holds at every await point.
//!
//! Budget rule: a producer whose buffer is empty and on which the
//! consumer is blocked may always fetch (otherwise the merge deadlocks
//! behind the budget); everything else is pre-fetch and is suspended
//! while the projected buffered total exceeds the budget.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use crate::continuation::codec::{RangeContinuation, RangeSeed};
use crate::observability::logger::{Logger, Severity};
use crate::observability::metrics::MetricsRegistry;
use crate::planner::plan::ORDER_BY_FILTER_PLACEHOLDER;
use crate::routing::provider::RoutingMapProvider;
use crate::routing::range::PartitionKeyRange;
use crate::transport::errors::TransportResult;
use crate::transport::executor::{ProducerPage, RequestExecutor};
use crate::transport::request::DocumentServiceRequest;
use crate::transport::retry::RetryPolicyFactory;
use crate::types::query::SqlQuery;

use super::cancel::CancellationSignal;
use super::errors::{QueryError, QueryResult};
use super::orderby::{format_resume_filter, OrderBySpec};
use super::producer::DocumentProducer;

type FetchFuture = Pin<Box<dyn Future<Output = (String, TransportResult<ProducerPage>)> + Send + 'static>>;

/// Result of waiting for one range to become consumable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// The range has at least one buffered page.
    Data,
    /// The range's feed is exhausted and its buffer is empty.
    Done,
    /// The range split; these are the replacement range ids.
    Replaced(Vec<String>),
}

/// Read-only view of one producer, for continuation building.
#[derive(Debug, Clone)]
pub struct ProducerSnapshot {
    pub range_id: String,
    pub min: String,
    pub max: String,
    /// Ids of ranges this one replaced through splits.
    pub parents: Vec<String>,
    pub resume_token: Option<String>,
    pub resume_exhausted: bool,
    pub has_buffered: bool,
    pub fetch_exhausted: bool,
}

/// Fetch sizing and limits for one pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub fetch_page_size: usize,
    pub buffer_budget: usize,
    pub max_concurrency: usize,
}

/// Owns the producers for one query and schedules their fetches.
pub struct ProducerPool {
    producers: Vec<DocumentProducer>,
    in_flight: FuturesUnordered<FetchFuture>,
    executor: Arc<dyn RequestExecutor>,
    routing: Arc<dyn RoutingMapProvider>,
    retry: Arc<dyn RetryPolicyFactory>,
    query: SqlQuery,
    order_by: Option<OrderBySpec>,
    collection_rid: String,
    activity_id: Uuid,
    config: PoolConfig,
    page_size_hint: Option<usize>,
    cancel: CancellationSignal,
    metrics: Arc<MetricsRegistry>,
}

impl ProducerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seeded_ranges: Vec<(PartitionKeyRange, RangeSeed)>,
        executor: Arc<dyn RequestExecutor>,
        routing: Arc<dyn RoutingMapProvider>,
        retry: Arc<dyn RetryPolicyFactory>,
        query: SqlQuery,
        order_by: Option<OrderBySpec>,
        collection_rid: impl Into<String>,
        activity_id: Uuid,
        config: PoolConfig,
        cancel: CancellationSignal,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let mut producers: Vec<DocumentProducer> = seeded_ranges
            .into_iter()
            .map(|(range, seed)| DocumentProducer::with_seed(range, seed.token, seed.order))
            .collect();
        producers.sort_by(|a, b| a.range().min_inclusive.cmp(&b.range().min_inclusive));

        Self {
            producers,
            in_flight: FuturesUnordered::new(),
            executor,
            routing,
            retry,
            query,
            order_by,
            collection_rid: collection_rid.into(),
            activity_id,
            config,
            page_size_hint: None,
            cancel,
            metrics,
        }
    }

    /// Range ids in `min_inclusive` order.
    pub fn range_ids(&self) -> Vec<String> {
        self.producers.iter().map(|p| p.range().id.clone()).collect()
    }

    pub fn total_buffered_items(&self) -> usize {
        self.producers.iter().map(|p| p.buffered_item_count()).sum()
    }

    pub fn all_drained(&self) -> bool {
        self.producers.iter().all(|p| p.is_drained())
    }

    /// Caps fetch page sizes, used when a TOP bounds the total item count.
    pub fn set_page_size_hint(&mut self, hint: usize) {
        if hint > 0 {
            self.page_size_hint = Some(hint);
        }
    }

    fn effective_page_size(&self) -> usize {
        match self.page_size_hint {
            Some(hint) => self.config.fetch_page_size.min(hint),
            None => self.config.fetch_page_size,
        }
    }

    /// Buffer depth below which a producer is refilled.
    fn low_watermark(&self) -> usize {
        self.effective_page_size()
    }

    fn index_of(&self, range_id: &str) -> Option<usize> {
        self.producers.iter().position(|p| p.range().id == range_id)
    }

    /// Pops the next buffered page for a range.
    pub fn pop_page_for(&mut self, range_id: &str) -> Option<ProducerPage> {
        let idx = self.index_of(range_id)?;
        self.producers[idx].pop_page()
    }

    /// Continuation entries for all ranges the consumer has not finished.
    pub fn parallel_resume_ranges(&self) -> Vec<RangeContinuation> {
        self.producers
            .iter()
            .filter(|p| !p.resume_exhausted())
            .map(|p| RangeContinuation {
                min: p.range().min_inclusive.clone(),
                max: p.range().max_exclusive.clone(),
                token: p.resume_continuation().map(str::to_string),
                order: None,
            })
            .collect()
    }

    /// Per-producer views for ORDER BY continuation building.
    pub fn snapshots(&self) -> Vec<ProducerSnapshot> {
        self.producers
            .iter()
            .map(|p| ProducerSnapshot {
                range_id: p.range().id.clone(),
                min: p.range().min_inclusive.clone(),
                max: p.range().max_exclusive.clone(),
                parents: p.range().parents.clone(),
                resume_token: p.resume_continuation().map(str::to_string),
                resume_exhausted: p.resume_exhausted(),
                has_buffered: p.has_buffered(),
                fetch_exhausted: p.fetch_exhausted(),
            })
            .collect()
    }

    /// Starts every fetch the scheduling policy allows.
    ///
    /// `priority` names a producer the consumer is blocked on; it may
    /// fetch even when the budget is exhausted.
    pub fn schedule_fetches(&mut self, priority: Option<&str>) {
        let page_size = self.effective_page_size();

        // The blocked producer goes first and skips the budget gate; its
        // fetch is demand, not pre-fetch.
        if let Some(idx) = priority.and_then(|id| self.index_of(id)) {
            if self.in_flight.len() < self.config.max_concurrency
                && self.producers[idx].can_start_fetch()
                && self.producers[idx].buffered_item_count() < self.low_watermark()
            {
                self.start_fetch(idx, page_size);
            }
        }

        for idx in 0..self.producers.len() {
            if self.in_flight.len() >= self.config.max_concurrency {
                break;
            }
            let producer = &self.producers[idx];
            if !producer.can_start_fetch() {
                continue;
            }
            if producer.buffered_item_count() >= self.low_watermark() {
                continue;
            }
            let projected = self.total_buffered_items() + (self.in_flight.len() + 1) * page_size;
            if projected > self.config.buffer_budget {
                continue;
            }
            self.start_fetch(idx, page_size);
        }
    }

    fn start_fetch(&mut self, idx: usize, page_size: usize) {
        let producer = &mut self.producers[idx];
        producer.begin_fetch();

        let range_id = producer.range().id.clone();
        let request = DocumentServiceRequest::new(
            self.collection_rid.clone(),
            range_id.clone(),
            self.query_for(idx),
            self.producers[idx].fetch_continuation().map(str::to_string),
            page_size,
            self.activity_id,
        );
        let executor = Arc::clone(&self.executor);
        let policy = self.retry.request_policy();
        self.in_flight.push(Box::pin(async move {
            let result = executor.execute(request, policy).await;
            (range_id, result)
        }));
    }

    /// The per-partition query for one producer, with the ORDER BY resume
    /// filter formatted into the rewritten query's placeholder.
    fn query_for(&self, idx: usize) -> SqlQuery {
        let Some(spec) = &self.order_by else {
            return self.query.clone();
        };
        if !self.query.text.contains(ORDER_BY_FILTER_PLACEHOLDER) {
            return self.query.clone();
        }
        let filter = match self.producers[idx].order_resume() {
            Some(state) => format_resume_filter(spec, state),
            None => "true".to_string(),
        };
        self.query
            .with_text(self.query.text.replace(ORDER_BY_FILTER_PLACEHOLDER, &filter))
    }

    /// Waits for one in-flight fetch and applies its result.
    async fn drive_one(&mut self) -> QueryResult<()> {
        let completed = {
            let cancel = self.cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                completed = self.in_flight.next() => completed,
            }
        };
        if self.cancel.is_cancelled() {
            self.abandon();
            return Err(QueryError::Cancelled);
        }
        match completed {
            Some((range_id, result)) => self.apply_fetch(range_id, result).await,
            None => Ok(()),
        }
    }

    async fn apply_fetch(
        &mut self,
        range_id: String,
        result: TransportResult<ProducerPage>,
    ) -> QueryResult<()> {
        let Some(idx) = self.index_of(&range_id) else {
            // The producer was replaced while this fetch was in flight;
            // a producer never has two outstanding fetches, so this is
            // unreachable in practice.
            return Ok(());
        };
        match result {
            Ok(page) => {
                self.metrics.increment_pages_fetched();
                self.metrics.add_documents_fetched(page.item_count() as u64);
                self.producers[idx].apply_page(page);
                Ok(())
            }
            Err(error) if error.is_partition_gone() => {
                self.producers[idx].mark_split();
                self.handle_split(&range_id).await
            }
            Err(error) => {
                self.producers[idx].mark_failed();
                self.metrics.increment_fetch_failures();
                Logger::log(
                    Severity::Error,
                    "query.fetch_failed",
                    &[
                        ("range_id", range_id.as_str()),
                        ("error", &error.to_string()),
                    ],
                );
                let err = QueryError::from_transport(&range_id, error);
                // Cancel every other producer before surfacing.
                self.abandon();
                Err(err)
            }
        }
    }

    /// Replaces a gone producer with one producer per child range.
    async fn handle_split(&mut self, parent_id: &str) -> QueryResult<()> {
        let children = self
            .routing
            .try_resolve_children(&self.collection_rid, parent_id)
            .await
            .map_err(|e| QueryError::from_transport(parent_id, e))?;
        if children.is_empty() {
            return Err(QueryError::PartitionGone {
                range_id: parent_id.to_string(),
            });
        }

        let Some(idx) = self.index_of(parent_id) else {
            return Err(QueryError::PartitionGone {
                range_id: parent_id.to_string(),
            });
        };
        let parent = self.producers.remove(idx);

        let mut children = children;
        children.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
        if !covers_exactly(parent.range(), &children) {
            return Err(QueryError::PartitionGone {
                range_id: parent_id.to_string(),
            });
        }

        Logger::log(
            Severity::Info,
            "query.split_resolved",
            &[
                ("parent_range_id", parent_id),
                ("child_count", &children.len().to_string()),
            ],
        );
        self.metrics.increment_splits_resolved();

        self.producers.extend(parent.split_children(children));
        self.producers
            .sort_by(|a, b| a.range().min_inclusive.cmp(&b.range().min_inclusive));
        Ok(())
    }

    /// Drops all in-flight fetches. Their results are discarded.
    pub fn abandon(&mut self) {
        self.in_flight = FuturesUnordered::new();
    }

    /// Waits until `range_id` has buffered data, is done, or was replaced
    /// by children after a split.
    pub async fn fill_range(&mut self, range_id: &str) -> QueryResult<FillOutcome> {
        loop {
            if self.cancel.is_cancelled() {
                self.abandon();
                return Err(QueryError::Cancelled);
            }
            let Some(idx) = self.index_of(range_id) else {
                let children: Vec<String> = self
                    .producers
                    .iter()
                    .filter(|p| p.range().parents.iter().any(|parent| parent == range_id))
                    .map(|p| p.range().id.clone())
                    .collect();
                return Ok(FillOutcome::Replaced(children));
            };
            if self.producers[idx].has_buffered() {
                return Ok(FillOutcome::Data);
            }
            if self.producers[idx].fetch_exhausted() {
                return Ok(FillOutcome::Done);
            }
            self.schedule_fetches(Some(range_id));
            debug_assert!(!self.in_flight.is_empty(), "blocked range must have a fetch");
            self.drive_one().await?;
        }
    }

    /// Waits until any producer has buffered data; `false` means every
    /// producer is drained.
    pub async fn fill_any(&mut self) -> QueryResult<bool> {
        loop {
            if self.cancel.is_cancelled() {
                self.abandon();
                return Err(QueryError::Cancelled);
            }
            if self.producers.iter().any(|p| p.has_buffered()) {
                return Ok(true);
            }
            if self.all_drained() {
                return Ok(false);
            }
            let priority = self
                .producers
                .iter()
                .find(|p| p.can_start_fetch() && !p.has_buffered())
                .map(|p| p.range().id.clone());
            self.schedule_fetches(priority.as_deref());
            self.drive_one().await?;
        }
    }
}

/// True when `children`, sorted by min, tile `parent` exactly.
fn covers_exactly(parent: &PartitionKeyRange, children: &[PartitionKeyRange]) -> bool {
    let Some(first) = children.first() else {
        return false;
    };
    let Some(last) = children.last() else {
        return false;
    };
    if first.min_inclusive != parent.min_inclusive || last.max_exclusive != parent.max_exclusive {
        return false;
    }
    children
        .windows(2)
        .all(|pair| pair[0].max_exclusive == pair[1].min_inclusive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_exactly() {
        let parent = PartitionKeyRange::new("0", "", "FF");
        let good = vec![
            PartitionKeyRange::new("1", "", "80"),
            PartitionKeyRange::new("2", "80", "FF"),
        ];
        assert!(covers_exactly(&parent, &good));

        let gap = vec![
            PartitionKeyRange::new("1", "", "40"),
            PartitionKeyRange::new("2", "80", "FF"),
        ];
        assert!(!covers_exactly(&parent, &gap));

        let short = vec![PartitionKeyRange::new("1", "", "80")];
        assert!(!covers_exactly(&parent, &short));

        assert!(!covers_exactly(&parent, &[]));
    }
}
