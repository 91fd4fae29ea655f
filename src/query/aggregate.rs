//! Aggregate component and the per-operator aggregators.
//!
//! Cross-partition aggregates cannot stream: every partition's partial
//! must be folded before the single result is known. Each item arriving
//! from the base is a per-partition partial (the rewritten query already
//! aggregated within the partition) or a raw value; the aggregators
//! accept both. The component fully consumes its source, then emits
//! exactly one page holding at most one result document.

use std::collections::HashMap;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::planner::plan::AggregateOperator;
use crate::types::feed::{FeedResponse, QueryMetrics};

use super::component::{DrainFuture, QueryComponent};
use super::errors::{QueryError, QueryResult};
use super::ordering::compare_values;

/// Property of the single result document holding the aggregate value.
pub const AGGREGATE_PROPERTY: &str = "aggregate";

/// Folds partition partials into one result. `result() == None` means
/// the aggregate is undefined and no result document is emitted.
pub trait Aggregator: Send {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()>;
    fn result(&self) -> Option<Value>;
}

fn expect_number(value: &Value, operator: &str) -> QueryResult<f64> {
    value.as_f64().ok_or_else(|| {
        QueryError::bad_request(format!("{operator} received a non-numeric partial: {value}"))
    })
}

/// SUM of numeric values; undefined over an empty input.
#[derive(Debug, Default)]
pub struct SumAggregator {
    sum: f64,
    seen_any: bool,
}

impl Aggregator for SumAggregator {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()> {
        if value.is_null() {
            return Ok(());
        }
        self.sum += expect_number(value, "SUM")?;
        self.seen_any = true;
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        self.seen_any.then(|| json!(self.sum))
    }
}

/// COUNT folds per-partition counts by addition.
#[derive(Debug, Default)]
pub struct CountAggregator {
    count: u64,
}

impl Aggregator for CountAggregator {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()> {
        if value.is_null() {
            return Ok(());
        }
        self.count += expect_number(value, "COUNT")? as u64;
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        Some(json!(self.count))
    }
}

/// MIN across partitions, in the cross-type total order.
#[derive(Debug, Default)]
pub struct MinAggregator {
    current: Option<Value>,
}

impl Aggregator for MinAggregator {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()> {
        if compare_values(Some(value), self.current.as_ref()) == std::cmp::Ordering::Less
            || self.current.is_none()
        {
            self.current = Some(value.clone());
        }
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        self.current.clone()
    }
}

/// MAX across partitions, in the cross-type total order.
#[derive(Debug, Default)]
pub struct MaxAggregator {
    current: Option<Value>,
}

impl Aggregator for MaxAggregator {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()> {
        if self.current.is_none()
            || compare_values(Some(value), self.current.as_ref()) == std::cmp::Ordering::Greater
        {
            self.current = Some(value.clone());
        }
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        self.current.clone()
    }
}

/// AVERAGE carried as a `(sum, count)` monoid and finalized at drain.
/// Partition partials arrive as `{"sum": s, "count": n}`; raw numeric
/// values fold as `(v, 1)`.
#[derive(Debug, Default)]
pub struct AverageAggregator {
    sum: f64,
    count: u64,
}

impl Aggregator for AverageAggregator {
    fn aggregate(&mut self, value: &Value) -> QueryResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if let Some(object) = value.as_object() {
            let sum = object.get("sum").and_then(Value::as_f64);
            let count = object.get("count").and_then(Value::as_u64);
            match (sum, count) {
                (Some(sum), Some(count)) => {
                    // A partition with no matching values reports count 0;
                    // it contributes nothing.
                    self.sum += sum;
                    self.count += count;
                    return Ok(());
                }
                _ => {
                    return Err(QueryError::bad_request(format!(
                        "AVERAGE received a malformed partial: {value}"
                    )))
                }
            }
        }
        self.sum += expect_number(value, "AVERAGE")?;
        self.count += 1;
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        (self.count > 0).then(|| json!(self.sum / self.count as f64))
    }
}

/// Builds the aggregator for an operator.
pub fn aggregator_for(operator: AggregateOperator) -> Box<dyn Aggregator> {
    match operator {
        AggregateOperator::Average => Box::<AverageAggregator>::default(),
        AggregateOperator::Count => Box::<CountAggregator>::default(),
        AggregateOperator::Max => Box::<MaxAggregator>::default(),
        AggregateOperator::Min => Box::<MinAggregator>::default(),
        AggregateOperator::Sum => Box::<SumAggregator>::default(),
    }
}

/// Unwraps the `{"item": v}` envelope VALUE queries return per partial.
/// An empty envelope means the partial is undefined.
fn unwrap_partial(item: &Value) -> Option<&Value> {
    match item.as_object() {
        Some(object) if object.contains_key("item") => object.get("item"),
        Some(object) if object.is_empty() => None,
        _ => Some(item),
    }
}

/// Fully consumes the source, then emits one page with the result.
pub struct AggregateComponent {
    source: Box<dyn QueryComponent>,
    aggregator: Box<dyn Aggregator>,
    activity_id: Uuid,
    done: bool,
}

impl AggregateComponent {
    pub fn new(source: Box<dyn QueryComponent>, operator: AggregateOperator, activity_id: Uuid) -> Self {
        Self {
            source,
            aggregator: aggregator_for(operator),
            activity_id,
            done: false,
        }
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut request_charge = 0.0;
        let mut query_metrics: HashMap<String, QueryMetrics> = HashMap::new();
        let mut consumed_any = false;

        while let Some(page) = self.source.drain(max_page_size).await? {
            request_charge += page.request_charge;
            QueryMetrics::merge_map(&mut query_metrics, &page.query_metrics);
            for item in &page.items {
                consumed_any = true;
                if let Some(value) = unwrap_partial(item) {
                    self.aggregator.aggregate(value)?;
                }
            }
        }

        let items = if consumed_any {
            match self.aggregator.result() {
                Some(value) => {
                    let mut document = serde_json::Map::new();
                    document.insert(AGGREGATE_PROPERTY.to_string(), value);
                    vec![Value::Object(document)]
                }
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        Ok(Some(FeedResponse {
            items,
            continuation: None,
            request_charge,
            query_metrics,
            activity_id: self.activity_id,
        }))
    }
}

impl QueryComponent for AggregateComponent {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}
