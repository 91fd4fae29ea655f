//! Planner boundary errors.

use thiserror::Error;

/// Result type for planning operations.
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Failures at the planner boundary. All of these are fatal for the
/// query; none are retried.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    /// The plan asks for a composition the pipeline does not support.
    #[error("query plan rejected: {0}")]
    Rejected(String),

    /// The planner could not parse or analyze the query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl PlannerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery(reason.into())
    }
}
