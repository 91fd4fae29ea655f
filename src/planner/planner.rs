//! Planner collaborator trait and plan validation.

use std::future::Future;
use std::pin::Pin;

use crate::types::query::SqlQuery;

use super::errors::{PlannerError, PlannerResult};
use super::plan::{DistinctType, PartitionedQueryExecutionInfo};

/// Future type returned by [`QueryPlanner::plan`].
pub type PlanFuture<'a> = Pin<Box<dyn Future<Output = PlannerResult<PartitionedQueryExecutionInfo>> + Send + 'a>>;

/// Produces a [`PartitionedQueryExecutionInfo`] for a query.
pub trait QueryPlanner: Send + Sync {
    fn plan<'a>(&'a self, query: &'a SqlQuery, collection_rid: &'a str) -> PlanFuture<'a>;
}

/// Rejects plan compositions the pipeline cannot execute correctly.
///
/// Checked once before any producer is created, so unsupported queries
/// fail before issuing requests.
pub fn validate_plan(plan: &PartitionedQueryExecutionInfo) -> PlannerResult<()> {
    if plan.aggregates.len() > 1 {
        return Err(PlannerError::rejected(
            "multiple aggregates are not supported across partitions",
        ));
    }
    if plan.has_aggregates() && !plan.has_select_value {
        return Err(PlannerError::rejected(
            "non-value aggregates are not supported across partitions",
        ));
    }
    if plan.has_aggregates() && plan.has_order_by() {
        return Err(PlannerError::rejected(
            "ORDER BY combined with an aggregate is not supported",
        ));
    }
    if plan.order_by_expressions.len() != plan.order_by_directions.len() {
        return Err(PlannerError::rejected(
            "ORDER BY expressions and directions differ in length",
        ));
    }
    if plan.distinct_type == DistinctType::Ordered && !plan.has_order_by() {
        return Err(PlannerError::rejected(
            "ordered DISTINCT requires an ORDER BY clause",
        ));
    }
    Ok(())
}
