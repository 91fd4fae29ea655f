//! Partitioned query execution info: the planner's output contract.

use serde::{Deserialize, Serialize};

use crate::routing::range::QueryRange;

/// Placeholder the planner leaves in a rewritten ORDER BY query. The
/// producer formats it with `TRUE` on a fresh run, or with the resume
/// filter derived from the continuation's order-by state.
pub const ORDER_BY_FILTER_PLACEHOLDER: &str = "{resume-filter}";

/// Sort direction of one ORDER BY column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "Ascending")]
    Asc,
    #[serde(rename = "Descending")]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Aggregate function applied across all partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOperator {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

/// DISTINCT flavor requested by the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistinctType {
    #[default]
    None,
    /// Hash-based, order-independent dedup.
    Unordered,
    /// Adjacent-equal collapse; only valid together with ORDER BY.
    Ordered,
}

/// Output of query planning for one query execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionedQueryExecutionInfo {
    /// Per-partition query text; empty means the original text is used.
    #[serde(default)]
    pub rewritten_query: String,
    /// ORDER BY expressions, e.g. `c.timestamp`.
    #[serde(default)]
    pub order_by_expressions: Vec<String>,
    /// One direction per ORDER BY expression.
    #[serde(default)]
    pub order_by_directions: Vec<SortDirection>,
    /// At most one aggregate is supported cross-partition.
    #[serde(default)]
    pub aggregates: Vec<AggregateOperator>,
    #[serde(default)]
    pub top: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// True when the query projects a bare VALUE (required for aggregates).
    #[serde(default)]
    pub has_select_value: bool,
    #[serde(default)]
    pub distinct_type: DistinctType,
    /// True when the query cannot be served by a single partition.
    #[serde(default)]
    pub requires_cross_partition: bool,
    /// Key ranges the query targets; empty targets the whole key space.
    #[serde(default)]
    pub query_ranges: Vec<QueryRange>,
}

impl PartitionedQueryExecutionInfo {
    pub fn has_order_by(&self) -> bool {
        !self.order_by_expressions.is_empty()
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty()
    }

    /// True when the pipeline degenerates to a single pass-through
    /// producer: nothing to merge, reorder, cap, or fold.
    pub fn is_passthrough(&self) -> bool {
        !self.has_order_by()
            && !self.has_aggregates()
            && self.top.is_none()
            && self.offset.is_none()
            && self.limit.is_none()
            && self.distinct_type == DistinctType::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_detection() {
        let plan = PartitionedQueryExecutionInfo::default();
        assert!(plan.is_passthrough());

        let mut with_top = PartitionedQueryExecutionInfo::default();
        with_top.top = Some(5);
        assert!(!with_top.is_passthrough());

        let mut with_order = PartitionedQueryExecutionInfo::default();
        with_order.order_by_expressions = vec!["c.ts".to_string()];
        with_order.order_by_directions = vec![SortDirection::Asc];
        assert!(!with_order.is_passthrough());
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let plan: PartitionedQueryExecutionInfo = serde_json::from_str("{}").unwrap();
        assert!(plan.aggregates.is_empty());
        assert_eq!(plan.distinct_type, DistinctType::None);
        assert!(!plan.requires_cross_partition);
    }
}
