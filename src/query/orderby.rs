//! ORDER BY base context: k-way merge across partition producers.
//!
//! Each range's feed is already sorted server-side, so a heap holding one
//! item per non-exhausted producer yields globally sorted output. A
//! producer whose buffer empties blocks the merge until its next page
//! arrives or it is marked done.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::continuation::codec::{CompositeContinuation, OrderByState, RangeContinuation};
use crate::planner::plan::SortDirection;
use crate::types::document::OrderByEnvelope;
use crate::types::feed::{FeedResponse, QueryMetrics};

use super::component::{DrainFuture, QueryComponent};
use super::errors::{QueryError, QueryResult};
use super::ordering::{canonical, compare_key_tuples};
use super::pool::{FillOutcome, ProducerPool};

/// ORDER BY expressions and their directions, from the query plan.
#[derive(Debug, Clone)]
pub struct OrderBySpec {
    pub expressions: Vec<String>,
    pub directions: Vec<SortDirection>,
}

/// A document lifted with its sort key tuple for cross-partition merge.
#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub keys: Vec<Option<Value>>,
    pub payload: Value,
    pub rid: Option<String>,
    pub source_range_id: String,
}

impl OrderByItem {
    fn from_document(document: &Value, source_range_id: &str) -> QueryResult<Self> {
        let envelope = OrderByEnvelope::from_document(document).ok_or_else(|| {
            QueryError::bad_request(format!(
                "range {source_range_id} returned a document without an order-by envelope"
            ))
        })?;
        Ok(Self {
            keys: envelope.keys(),
            rid: envelope.rid.clone(),
            payload: envelope.payload,
            source_range_id: source_range_id.to_string(),
        })
    }
}

/// Total merge order: sort keys with directions, then rid, then source
/// range id. Rid is a monotonic document identifier, so the tie-break is
/// stable across runs.
fn compare_items(a: &OrderByItem, b: &OrderByItem, directions: &[SortDirection]) -> Ordering {
    compare_key_tuples(&a.keys, &b.keys, directions)
        .then_with(|| a.rid.cmp(&b.rid))
        .then_with(|| a.source_range_id.cmp(&b.source_range_id))
}

/// Compares an item against a resume boundary (keys + rid).
fn compare_to_boundary(
    item: &OrderByItem,
    boundary_keys: &[Option<Value>],
    boundary_rid: &Option<String>,
    directions: &[SortDirection],
) -> Ordering {
    compare_key_tuples(&item.keys, boundary_keys, directions)
        .then_with(|| item.rid.cmp(boundary_rid))
}

struct HeapEntry {
    item: OrderByItem,
    directions: Arc<Vec<SortDirection>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the merge-smallest entry.
        compare_items(&other.item, &self.item, &self.directions)
    }
}

/// Formats the per-range resume filter for the rewritten query's
/// placeholder: strictly-after-the-boundary in the merge order, with a
/// rid disambiguator for equal keys.
///
/// Boundary keys that are null or undefined cannot be expressed in a
/// filter; those resume with `true` and rely on the merge's client-side
/// boundary skip, which may refetch already-emitted items but never
/// drops one.
pub fn format_resume_filter(spec: &OrderBySpec, state: &OrderByState) -> String {
    if state.keys.len() != spec.expressions.len()
        || state.keys.iter().any(|k| k.is_null())
    {
        return "true".to_string();
    }

    let rendered: Vec<String> = state
        .keys
        .iter()
        .map(|k| serde_json::to_string(k).unwrap_or_else(|_| "null".to_string()))
        .collect();

    let mut clauses: Vec<String> = Vec::new();
    for i in 0..spec.expressions.len() {
        let mut parts: Vec<String> = Vec::new();
        for j in 0..i {
            parts.push(format!("{} = {}", spec.expressions[j], rendered[j]));
        }
        let op = match spec.directions[i] {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        };
        parts.push(format!("{} {} {}", spec.expressions[i], op, rendered[i]));
        clauses.push(parts.join(" AND "));
    }

    if let Some(rid) = &state.rid {
        let mut parts: Vec<String> = spec
            .expressions
            .iter()
            .zip(&rendered)
            .map(|(expr, value)| format!("{expr} = {value}"))
            .collect();
        parts.push(format!("c._rid > {}", serde_json::to_string(rid).unwrap_or_default()));
        clauses.push(parts.join(" AND "));
    }

    let wrapped: Vec<String> = clauses.into_iter().map(|c| format!("({c})")).collect();
    wrapped.join(" OR ")
}

/// The ORDER BY execution context.
pub struct OrderByContext {
    pool: ProducerPool,
    directions: Arc<Vec<SortDirection>>,
    heap: BinaryHeap<HeapEntry>,
    item_queues: HashMap<String, VecDeque<OrderByItem>>,
    initialized: bool,
    /// Boundary at-or-before which resumed items are dropped.
    resume_point: Option<(Vec<Option<Value>>, Option<String>)>,
    /// Last item handed downstream; becomes the next continuation's state.
    boundary: Option<(Vec<Option<Value>>, Option<String>)>,
    /// Collapse adjacent equal payloads (ordered DISTINCT).
    collapse_adjacent: bool,
    last_fingerprint: Option<String>,
    charge_accum: f64,
    metrics_accum: HashMap<String, QueryMetrics>,
    collection_rid: String,
    activity_id: Uuid,
    done: bool,
}

impl OrderByContext {
    pub fn new(
        pool: ProducerPool,
        spec: &OrderBySpec,
        collection_rid: impl Into<String>,
        activity_id: Uuid,
        collapse_adjacent: bool,
        resume: Option<OrderByState>,
    ) -> Self {
        let resume_point = resume.map(|state| {
            let keys = state
                .keys
                .into_iter()
                // Stored null stands for both null and undefined; treating
                // it as undefined resumes earlier, trading a possible
                // boundary duplicate for never losing an item.
                .map(|k| if k.is_null() { None } else { Some(k) })
                .collect();
            (keys, state.rid)
        });
        Self {
            pool,
            directions: Arc::new(spec.directions.clone()),
            heap: BinaryHeap::new(),
            item_queues: HashMap::new(),
            initialized: false,
            boundary: resume_point.clone(),
            resume_point,
            collapse_adjacent,
            last_fingerprint: None,
            charge_accum: 0.0,
            metrics_accum: HashMap::new(),
            collection_rid: collection_rid.into(),
            activity_id,
            done: false,
        }
    }

    /// Moves buffered pages for `range_id` into its item queue, dropping
    /// items at or before the resume boundary.
    fn absorb_pages(&mut self, range_id: &str) -> QueryResult<bool> {
        let mut absorbed = false;
        while let Some(page) = self.pool.pop_page_for(range_id) {
            absorbed = true;
            self.charge_accum += page.request_charge;
            QueryMetrics::merge_map(&mut self.metrics_accum, &page.query_metrics);
            let queue = self.item_queues.entry(range_id.to_string()).or_default();
            for document in &page.items {
                let item = OrderByItem::from_document(document, range_id)?;
                if let Some((keys, rid)) = &self.resume_point {
                    if compare_to_boundary(&item, keys, rid, &self.directions) != Ordering::Greater
                    {
                        continue;
                    }
                }
                queue.push_back(item);
            }
        }
        Ok(absorbed)
    }

    /// Ensures the heap holds one item for every listed range (or its
    /// split replacements) that can still produce one.
    async fn ensure_heads(&mut self, ranges: Vec<String>) -> QueryResult<()> {
        let mut work: VecDeque<String> = ranges.into();
        while let Some(range_id) = work.pop_front() {
            loop {
                if let Some(item) = self
                    .item_queues
                    .get_mut(&range_id)
                    .and_then(VecDeque::pop_front)
                {
                    self.heap.push(HeapEntry {
                        item,
                        directions: Arc::clone(&self.directions),
                    });
                    break;
                }
                if self.absorb_pages(&range_id)? {
                    continue;
                }
                match self.pool.fill_range(&range_id).await? {
                    FillOutcome::Data => continue,
                    FillOutcome::Done => break,
                    FillOutcome::Replaced(children) => {
                        // Parent items already queued were consumed above;
                        // the children take over from here.
                        work.extend(children);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// True when nothing remains anywhere downstream of the merge.
    fn exhausted(&self) -> bool {
        self.heap.is_empty()
            && self.item_queues.values().all(VecDeque::is_empty)
            && self.pool.all_drained()
    }

    fn build_continuation(&self) -> Option<CompositeContinuation> {
        if self.exhausted() {
            return None;
        }
        let order_state = self.boundary.as_ref().map(|(keys, rid)| OrderByState {
            keys: keys
                .iter()
                .map(|k| k.clone().unwrap_or(Value::Null))
                .collect(),
            rid: rid.clone(),
        });

        let mut ranges: Vec<RangeContinuation> = Vec::new();
        for snapshot in self.pool.snapshots() {
            let pending = |range_id: &str| {
                self.item_queues
                    .get(range_id)
                    .map(|q| !q.is_empty())
                    .unwrap_or(false)
                    || self
                        .heap
                        .iter()
                        .any(|entry| entry.item.source_range_id == range_id)
            };
            // Items absorbed from a split-away parent still count against
            // the child covering its range.
            let outstanding = pending(&snapshot.range_id)
                || snapshot.parents.iter().any(|parent| pending(parent));
            let spent = snapshot.fetch_exhausted && !snapshot.has_buffered && !outstanding;
            if spent {
                continue;
            }
            // The server token is only valid as a resume position when the
            // merge has consumed everything fetched so far; otherwise the
            // range replays from the start and the order filter skips what
            // was already emitted.
            let caught_up = !snapshot.has_buffered && !outstanding;
            ranges.push(RangeContinuation {
                min: snapshot.min,
                max: snapshot.max,
                token: if caught_up { snapshot.resume_token } else { None },
                order: order_state.clone(),
            });
        }
        if ranges.is_empty() {
            return None;
        }
        Some(CompositeContinuation::new(self.collection_rid.clone(), ranges))
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }
        if !self.initialized {
            self.initialized = true;
            let ranges = self.pool.range_ids();
            self.ensure_heads(ranges).await?;
        }

        let mut items: Vec<Value> = Vec::new();
        while items.len() < max_page_size {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            let item = entry.item;
            // Refill from the same producer before emitting, so the heap
            // never starves a live range.
            self.ensure_heads(vec![item.source_range_id.clone()]).await?;

            self.boundary = Some((item.keys.clone(), item.rid.clone()));

            if self.collapse_adjacent {
                let fingerprint = canonical(&item.payload);
                if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
                    continue;
                }
                self.last_fingerprint = Some(fingerprint);
            }
            items.push(item.payload);
        }

        if items.is_empty() && self.exhausted() {
            self.done = true;
            if self.charge_accum == 0.0 {
                return Ok(None);
            }
        }

        let continuation = self.build_continuation();
        if continuation.is_none() {
            self.done = true;
        }
        Ok(Some(FeedResponse {
            items,
            continuation,
            request_charge: std::mem::take(&mut self.charge_accum),
            query_metrics: std::mem::take(&mut self.metrics_accum),
            activity_id: self.activity_id,
        }))
    }
}

impl QueryComponent for OrderByContext {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}
