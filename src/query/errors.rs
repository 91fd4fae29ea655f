//! Query pipeline error taxonomy.
//!
//! Per-range failures propagate to the base context, which cancels every
//! other producer before surfacing. Pages already emitted are never
//! retracted; the consumer may resume from the last emitted continuation.

use thiserror::Error;

use crate::continuation::codec::ContinuationError;
use crate::planner::errors::PlannerError;
use crate::transport::errors::TransportError;

/// Result type for pipeline operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Everything a query execution can fail with.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// A target range split mid-query. Consumed internally by split
    /// resolution; surfaces only when resolution itself fails.
    #[error("partition key range {range_id} is gone")]
    PartitionGone { range_id: String },

    /// The supplied continuation could not be parsed or resumed.
    #[error("invalid continuation: {0}")]
    InvalidContinuation(String),

    /// 429 on a range after the retry policy gave up.
    #[error("request rate too large on range {range_id}")]
    Throttled { range_id: String },

    /// Transport timeout on a range after the retry policy gave up.
    #[error("request timed out on range {range_id}")]
    TimedOut { range_id: String },

    /// The consumer cancelled the query.
    #[error("query cancelled")]
    Cancelled,

    /// The plan asks for an unsupported composition.
    #[error("query plan rejected: {0}")]
    PlanRejected(String),

    /// 5xx on a range after retries.
    #[error("backend error {status} on range {range_id}: {message}")]
    BackendError {
        status: u16,
        range_id: String,
        message: String,
    },

    /// Any other 4xx, or a request the pipeline refuses to issue.
    #[error("bad request: {message}")]
    BadRequest { message: String },
}

impl QueryError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Maps a post-retry transport failure on `range_id` into the taxonomy.
    pub fn from_transport(range_id: &str, error: TransportError) -> Self {
        match error {
            TransportError::Gone { .. } => Self::PartitionGone {
                range_id: range_id.to_string(),
            },
            TransportError::Throttled { .. } => Self::Throttled {
                range_id: range_id.to_string(),
            },
            TransportError::TimedOut => Self::TimedOut {
                range_id: range_id.to_string(),
            },
            TransportError::Server { status, message } => Self::BackendError {
                status,
                range_id: range_id.to_string(),
                message,
            },
            TransportError::BadRequest { status, message } => Self::BadRequest {
                message: format!("range {range_id} rejected request ({status}): {message}"),
            },
        }
    }
}

impl From<ContinuationError> for QueryError {
    fn from(e: ContinuationError) -> Self {
        Self::InvalidContinuation(e.to_string())
    }
}

impl From<PlannerError> for QueryError {
    fn from(e: PlannerError) -> Self {
        match e {
            PlannerError::Rejected(reason) => Self::PlanRejected(reason),
            PlannerError::InvalidQuery(reason) => Self::BadRequest { message: reason },
        }
    }
}
