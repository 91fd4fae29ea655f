//! Shared test doubles: scripted transport, static routing map, static
//! planner.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use stratus_client::observability::MetricsRegistry;
use stratus_client::planner::planner::PlanFuture;
use stratus_client::planner::{PartitionedQueryExecutionInfo, QueryPlanner};
use stratus_client::query::PipelineDeps;
use stratus_client::routing::provider::RoutingFuture;
use stratus_client::routing::{PartitionKeyRange, QueryRange, RoutingMapProvider};
use stratus_client::transport::executor::ExecuteFuture;
use stratus_client::transport::{
    DocumentServiceRequest, NoRetry, ProducerPage, RequestExecutor, RetryPolicy, TransportError,
};
use stratus_client::types::feed::QueryMetrics;
use stratus_client::types::FeedResponse;

/// What a scripted range does when its pages run out.
pub enum EndBehavior {
    /// Final page carries no continuation.
    End,
    /// One more fetch is attempted and answered with 410/range-gone.
    Gone,
    /// One more fetch is attempted and answered with this failure.
    Fail(TransportError),
}

/// The feed one partition key range serves.
pub struct ScriptedRange {
    /// Global index of this range's first page; children of a split start
    /// where the parent's script left off.
    pub start: usize,
    pub pages: Vec<Vec<Value>>,
    pub end: EndBehavior,
}

impl ScriptedRange {
    pub fn serving(pages: Vec<Vec<Value>>) -> Self {
        Self {
            start: 0,
            pages,
            end: EndBehavior::End,
        }
    }

    pub fn starting_at(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn then_gone(mut self) -> Self {
        self.end = EndBehavior::Gone;
        self
    }

    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.end = EndBehavior::Fail(error);
        self
    }
}

fn continuation_token(next_index: usize) -> String {
    format!("idx:{next_index}")
}

fn parse_token(token: &str) -> usize {
    token
        .strip_prefix("idx:")
        .and_then(|raw| raw.parse().ok())
        .expect("scripted continuation token")
}

/// Request executor replaying scripted per-range feeds. Continuations are
/// global page indexes, so a child range picks up where its split-away
/// parent stopped.
#[derive(Default)]
pub struct ScriptedExecutor {
    ranges: Mutex<HashMap<String, ScriptedRange>>,
    log: Mutex<Vec<DocumentServiceRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, range_id: &str, range: ScriptedRange) -> Self {
        self.ranges.lock().unwrap().insert(range_id.to_string(), range);
        self
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<DocumentServiceRequest> {
        self.log.lock().unwrap().clone()
    }

    fn serve(&self, request: &DocumentServiceRequest) -> Result<ProducerPage, TransportError> {
        let ranges = self.ranges.lock().unwrap();
        let script = ranges
            .get(&request.partition_key_range_id)
            .unwrap_or_else(|| panic!("no script for range {}", request.partition_key_range_id));

        let global = match &request.continuation {
            None => script.start,
            Some(token) => parse_token(token),
        };
        let local = global.saturating_sub(script.start);

        if local >= script.pages.len() {
            return match &script.end {
                EndBehavior::Gone => Err(TransportError::from_status(410, 1002, "range split")),
                EndBehavior::Fail(error) => Err(error.clone()),
                EndBehavior::End => panic!(
                    "range {} fetched past its final page",
                    request.partition_key_range_id
                ),
            };
        }

        let items = script.pages[local].clone();
        let is_last = local + 1 == script.pages.len() && matches!(script.end, EndBehavior::End);
        let continuation = (!is_last).then(|| continuation_token(global + 1));

        let mut query_metrics = HashMap::new();
        query_metrics.insert(
            request.partition_key_range_id.clone(),
            QueryMetrics {
                retrieved_document_count: items.len() as u64,
                output_document_count: items.len() as u64,
                ..Default::default()
            },
        );

        Ok(ProducerPage {
            items,
            continuation,
            request_charge: 1.0,
            activity_id: request.activity_id,
            query_metrics,
            source_range_id: request.partition_key_range_id.clone(),
        })
    }
}

impl RequestExecutor for ScriptedExecutor {
    fn execute(
        &self,
        request: DocumentServiceRequest,
        _retry_policy: Box<dyn RetryPolicy>,
    ) -> ExecuteFuture<'_> {
        self.log.lock().unwrap().push(request.clone());
        let result = self.serve(&request);
        Box::pin(async move { result })
    }
}

/// Static routing snapshot with scripted split children.
#[derive(Default)]
pub struct StaticRoutingMap {
    ranges: Vec<PartitionKeyRange>,
    children: HashMap<String, Vec<PartitionKeyRange>>,
}

impl StaticRoutingMap {
    pub fn with_ranges(ranges: Vec<PartitionKeyRange>) -> Self {
        Self {
            ranges,
            children: HashMap::new(),
        }
    }

    pub fn split(mut self, parent_id: &str, children: Vec<PartitionKeyRange>) -> Self {
        self.children.insert(parent_id.to_string(), children);
        self
    }
}

impl RoutingMapProvider for StaticRoutingMap {
    fn resolve_ranges<'a>(
        &'a self,
        _collection_rid: &'a str,
        target: &'a QueryRange,
    ) -> RoutingFuture<'a, Vec<PartitionKeyRange>> {
        let mut overlapping = self.ranges.clone();
        stratus_client::routing::range::select_overlapping(
            &mut overlapping,
            std::slice::from_ref(target),
        );
        overlapping.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
        Box::pin(async move { Ok(overlapping) })
    }

    fn try_resolve_children<'a>(
        &'a self,
        _collection_rid: &'a str,
        range_id: &'a str,
    ) -> RoutingFuture<'a, Vec<PartitionKeyRange>> {
        let children = self.children.get(range_id).cloned().unwrap_or_default();
        Box::pin(async move { Ok(children) })
    }
}

/// Planner returning a fixed plan.
pub struct StaticPlanner {
    plan: PartitionedQueryExecutionInfo,
}

impl StaticPlanner {
    pub fn new(plan: PartitionedQueryExecutionInfo) -> Self {
        Self { plan }
    }
}

impl QueryPlanner for StaticPlanner {
    fn plan<'a>(
        &'a self,
        _query: &'a stratus_client::SqlQuery,
        _collection_rid: &'a str,
    ) -> PlanFuture<'a> {
        let plan = self.plan.clone();
        Box::pin(async move { Ok(plan) })
    }
}

pub fn range(id: &str, min: &str, max: &str) -> PartitionKeyRange {
    PartitionKeyRange::new(id, min, max)
}

pub fn deps(
    executor: ScriptedExecutor,
    routing: StaticRoutingMap,
    plan: PartitionedQueryExecutionInfo,
) -> PipelineDeps {
    deps_shared(Arc::new(executor), routing, plan)
}

/// Like [`deps`], but keeps the executor handle so tests can inspect the
/// request log afterwards.
pub fn deps_shared(
    executor: Arc<ScriptedExecutor>,
    routing: StaticRoutingMap,
    plan: PartitionedQueryExecutionInfo,
) -> PipelineDeps {
    PipelineDeps {
        executor,
        routing: Arc::new(routing),
        retry: Arc::new(NoRetry),
        planner: Arc::new(StaticPlanner::new(plan)),
        metrics: Arc::new(MetricsRegistry::new()),
    }
}

/// An ORDER BY wire item: sort keys, payload, rid.
pub fn order_by_doc(keys: &[Value], payload: Value, rid: &str) -> Value {
    json!({
        "orderByItems": keys.iter().map(|k| json!({ "item": k })).collect::<Vec<_>>(),
        "payload": payload,
        "_rid": rid,
    })
}

/// Drains a stream to completion, panicking on error.
pub async fn collect_pages(stream: &mut stratus_client::QueryStream) -> Vec<FeedResponse> {
    let mut pages = Vec::new();
    while let Some(page) = stream.next_page().await.expect("query succeeds") {
        pages.push(page);
    }
    pages
}

/// All items across all pages, in emission order.
pub fn all_items(pages: &[FeedResponse]) -> Vec<Value> {
    pages.iter().flat_map(|page| page.items.clone()).collect()
}
