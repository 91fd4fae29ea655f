//! Pipeline factory and the consumer-facing query stream.
//!
//! `execute_query` plans the query, resolves target ranges, reconstructs
//! any continuation, and wires the component stack outer→inner:
//! Take(limit) → Take(top) → Skip → Distinct → Aggregate → base. Each
//! component is added only when the plan demands it; a single-range query
//! with none of them degenerates to one pass-through producer under the
//! parallel base.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::Stream;
use uuid::Uuid;

use crate::continuation::codec::{CompositeContinuation, OuterState, RangeSeed};
use crate::observability::logger::{Logger, Severity};
use crate::observability::metrics::MetricsRegistry;
use crate::planner::plan::{DistinctType, PartitionedQueryExecutionInfo};
use crate::planner::planner::{validate_plan, QueryPlanner};
use crate::routing::provider::RoutingMapProvider;
use crate::routing::range::{PartitionKeyRange, QueryRange};
use crate::transport::executor::RequestExecutor;
use crate::transport::retry::RetryPolicyFactory;
use crate::types::feed::{FeedOptions, FeedResponse};
use crate::types::query::SqlQuery;

use super::aggregate::AggregateComponent;
use super::cancel::CancellationSignal;
use super::component::QueryComponent;
use super::distinct::DistinctComponent;
use super::errors::{QueryError, QueryResult};
use super::orderby::{OrderByContext, OrderBySpec};
use super::parallel::ParallelContext;
use super::pool::{PoolConfig, ProducerPool};
use super::skip::SkipComponent;
use super::take::{TakeComponent, TakeKind};

/// The collaborators a pipeline is built from. All injected at
/// construction; tests swap in doubles here.
#[derive(Clone)]
pub struct PipelineDeps {
    pub executor: Arc<dyn RequestExecutor>,
    pub routing: Arc<dyn RoutingMapProvider>,
    pub retry: Arc<dyn RetryPolicyFactory>,
    pub planner: Arc<dyn QueryPlanner>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Executes a query, returning the cross-partition result stream.
pub async fn execute_query(
    deps: &PipelineDeps,
    collection_rid: &str,
    query: SqlQuery,
    options: FeedOptions,
) -> QueryResult<QueryStream> {
    deps.metrics.increment_queries_started();
    let activity_id = Uuid::new_v4();

    let plan = deps.planner.plan(&query, collection_rid).await?;
    validate_plan(&plan)?;

    let target_ranges = resolve_target_ranges(deps, collection_rid, &plan).await?;

    if (plan.requires_cross_partition || target_ranges.len() > 1)
        && !options.enable_cross_partition_query
    {
        return Err(QueryError::bad_request(
            "the query targets multiple partitions; enable cross-partition queries to run it",
        ));
    }

    let (seeded, outer) = match &options.request_continuation {
        Some(token) => {
            deps.metrics.increment_continuations_resumed();
            let continuation = CompositeContinuation::from_token(token, collection_rid)?;
            let seeded = continuation.seed_producers(&target_ranges)?;
            (seeded, continuation.outer)
        }
        None => (
            target_ranges
                .into_iter()
                .map(|range| (range, RangeSeed::default()))
                .collect(),
            OuterState::default(),
        ),
    };

    Logger::log(
        Severity::Trace,
        "query.pipeline_created",
        &[
            ("activity_id", &activity_id.to_string()),
            ("producer_count", &seeded.len().to_string()),
            ("order_by", &plan.has_order_by().to_string()),
        ],
    );

    let component = build_pipeline(
        deps,
        collection_rid,
        &query,
        &plan,
        &options,
        seeded,
        &outer,
        activity_id,
    )?;

    Ok(QueryStream {
        component: component.component,
        cancel: component.cancel,
        page_size: options.page_size(),
        metrics: Arc::clone(&deps.metrics),
        finished: false,
    })
}

/// Resolves and dedupes the partition key ranges the plan targets.
async fn resolve_target_ranges(
    deps: &PipelineDeps,
    collection_rid: &str,
    plan: &PartitionedQueryExecutionInfo,
) -> QueryResult<Vec<PartitionKeyRange>> {
    let full_range = [QueryRange::full()];
    let targets: &[QueryRange] = if plan.query_ranges.is_empty() {
        &full_range
    } else {
        &plan.query_ranges
    };

    let mut by_min: BTreeMap<String, PartitionKeyRange> = BTreeMap::new();
    for target in targets {
        let resolved = deps
            .routing
            .resolve_ranges(collection_rid, target)
            .await
            .map_err(|e| QueryError::from_transport(collection_rid, e))?;
        for range in resolved {
            by_min.insert(range.min_inclusive.clone(), range);
        }
    }
    Ok(by_min.into_values().collect())
}

struct BuiltPipeline {
    component: Box<dyn QueryComponent>,
    cancel: CancellationSignal,
}

#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    deps: &PipelineDeps,
    collection_rid: &str,
    query: &SqlQuery,
    plan: &PartitionedQueryExecutionInfo,
    options: &FeedOptions,
    seeded: Vec<(PartitionKeyRange, RangeSeed)>,
    outer: &OuterState,
    activity_id: Uuid,
) -> QueryResult<BuiltPipeline> {
    let cancel = CancellationSignal::new();

    let per_partition_query = if plan.rewritten_query.is_empty() {
        query.clone()
    } else {
        query.with_text(&plan.rewritten_query)
    };

    let order_by = plan.has_order_by().then(|| OrderBySpec {
        expressions: plan.order_by_expressions.clone(),
        directions: plan.order_by_directions.clone(),
    });

    let config = PoolConfig {
        fetch_page_size: options.page_size(),
        buffer_budget: options.buffered_item_budget(),
        max_concurrency: resolve_parallelism(options.max_degree_of_parallelism, seeded.len()),
    };

    // Remaining counts survive resumes through the outer state; a fresh
    // run starts from the plan's clause values.
    let top_remaining = outer.top_remaining.or(plan.top);
    let limit_remaining = outer.limit_remaining.or(plan.limit);
    let skip_remaining = outer.skip_remaining.or(plan.offset);

    let resume_order_state = seeded.iter().find_map(|(_, seed)| seed.order.clone());

    let mut pool = ProducerPool::new(
        seeded,
        Arc::clone(&deps.executor),
        Arc::clone(&deps.routing),
        Arc::clone(&deps.retry),
        per_partition_query,
        order_by.clone(),
        collection_rid,
        activity_id,
        config,
        cancel.clone(),
        Arc::clone(&deps.metrics),
    );

    // A TOP/LIMIT bounds the total item count; cap fetch pages so the
    // producers never pull far past what the caps can emit.
    let take_bound = match (top_remaining, limit_remaining) {
        (Some(top), Some(limit)) => Some(top.min(limit)),
        (bound @ Some(_), None) | (None, bound @ Some(_)) => bound,
        (None, None) => None,
    };
    if let Some(bound) = take_bound {
        let hint = bound.saturating_add(skip_remaining.unwrap_or(0));
        pool.set_page_size_hint(usize::try_from(hint).unwrap_or(usize::MAX));
    }

    let mut component: Box<dyn QueryComponent> = match &order_by {
        Some(spec) => Box::new(OrderByContext::new(
            pool,
            spec,
            collection_rid,
            activity_id,
            plan.distinct_type == DistinctType::Ordered,
            resume_order_state,
        )),
        None => Box::new(ParallelContext::new(pool, collection_rid, activity_id)),
    };

    if let Some(operator) = plan.aggregates.first() {
        component = Box::new(AggregateComponent::new(component, *operator, activity_id));
    }

    if plan.distinct_type == DistinctType::Unordered {
        component = match &outer.distinct_state {
            Some(state) => Box::new(DistinctComponent::with_state(component, state)?),
            None => Box::new(DistinctComponent::new(component)),
        };
    }

    // Included even at zero remaining, so resumed tokens keep carrying
    // the exhausted counter instead of re-applying the plan's offset.
    if let Some(skip) = skip_remaining {
        component = Box::new(SkipComponent::new(component, skip, activity_id));
    }

    if let Some(top) = top_remaining {
        component = Box::new(TakeComponent::new(component, TakeKind::Top, top));
    }

    if let Some(limit) = limit_remaining {
        component = Box::new(TakeComponent::new(component, TakeKind::Limit, limit));
    }

    Ok(BuiltPipeline { component, cancel })
}

/// Resolves the concurrent-fetch cap from the user knob.
fn resolve_parallelism(requested: i32, producer_count: usize) -> usize {
    if producer_count == 0 {
        return 1;
    }
    if requested < 0 {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        return producer_count.min(cores * 2).max(1);
    }
    match requested {
        0 | 1 => 1,
        n => (n as usize).min(producer_count),
    }
}

/// The cross-partition result stream handed to the consumer.
pub struct QueryStream {
    component: Box<dyn QueryComponent>,
    cancel: CancellationSignal,
    page_size: usize,
    metrics: Arc<MetricsRegistry>,
    finished: bool,
}

impl QueryStream {
    /// Produces the next page, or `None` at end-of-stream.
    pub async fn next_page(&mut self) -> QueryResult<Option<FeedResponse>> {
        if self.finished {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Err(QueryError::Cancelled);
        }
        match self.component.drain(self.page_size).await {
            Ok(Some(page)) => {
                self.metrics.increment_pages_emitted();
                self.metrics.add_documents_emitted(page.items.len() as u64);
                if page.continuation.is_none() {
                    self.finished = true;
                    self.metrics.increment_queries_completed();
                }
                Ok(Some(page))
            }
            Ok(None) => {
                self.finished = true;
                self.metrics.increment_queries_completed();
                Ok(None)
            }
            Err(error) => {
                self.finished = true;
                self.metrics.increment_queries_failed();
                Err(error)
            }
        }
    }

    /// A handle that cancels the query from another task.
    pub fn cancel_signal(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    /// Adapts the stream to `futures_util::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = QueryResult<FeedResponse>> + Send {
        futures_util::stream::unfold(self, |mut stream| async move {
            match stream.next_page().await {
                Ok(Some(page)) => Some((Ok(page), stream)),
                Ok(None) => None,
                Err(error) => Some((Err(error), stream)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_parallelism() {
        assert_eq!(resolve_parallelism(0, 8), 1);
        assert_eq!(resolve_parallelism(1, 8), 1);
        assert_eq!(resolve_parallelism(4, 8), 4);
        assert_eq!(resolve_parallelism(16, 8), 8);

        let auto = resolve_parallelism(-1, 4);
        assert!(auto >= 1 && auto <= 4);
    }

    #[test]
    fn test_resolve_parallelism_no_producers() {
        assert_eq!(resolve_parallelism(-1, 0), 1);
    }
}
