//! Typed transport failures.
//!
//! These are the failures the request executor surfaces after its retry
//! policy is exhausted. The pipeline maps them onto the query error
//! taxonomy; only range-gone is ever consumed silently (it triggers split
//! resolution).

use std::time::Duration;

use thiserror::Error;

/// Sub-status accompanying a 410 when a partition key range has split.
pub const SUB_STATUS_PARTITION_RANGE_GONE: u32 = 1002;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A request failure, post-retry.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 410 with the range-gone sub-status: the target range has split.
    #[error("partition key range is gone (410/{sub_status})")]
    Gone { sub_status: u32 },

    /// 429 after the retry policy gave up.
    #[error("request rate too large (429), retry after {retry_after:?}")]
    Throttled { retry_after: Option<Duration> },

    /// The transport-level request timeout elapsed.
    #[error("request timed out")]
    TimedOut,

    /// 5xx from the backend.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other 4xx.
    #[error("bad request ({status}): {message}")]
    BadRequest { status: u16, message: String },
}

impl TransportError {
    /// Builds the typed error for a raw status / sub-status pair.
    pub fn from_status(status: u16, sub_status: u32, message: impl Into<String>) -> Self {
        match status {
            410 if sub_status == SUB_STATUS_PARTITION_RANGE_GONE => Self::Gone { sub_status },
            429 => Self::Throttled { retry_after: None },
            408 => Self::TimedOut,
            s if s >= 500 => Self::Server {
                status: s,
                message: message.into(),
            },
            s => Self::BadRequest {
                status: s,
                message: message.into(),
            },
        }
    }

    /// The HTTP status this failure corresponds to.
    pub fn status(&self) -> u16 {
        match self {
            Self::Gone { .. } => 410,
            Self::Throttled { .. } => 429,
            Self::TimedOut => 408,
            Self::Server { status, .. } => *status,
            Self::BadRequest { status, .. } => *status,
        }
    }

    /// True when the failure means the target range has split.
    pub fn is_partition_gone(&self) -> bool {
        matches!(self, Self::Gone { sub_status } if *sub_status == SUB_STATUS_PARTITION_RANGE_GONE)
    }

    /// True when a retry policy is allowed to retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::TimedOut)
    }
}
