//! Retry policy collaborator boundary.
//!
//! The pipeline never retries; it creates one fresh policy per request
//! and forwards it to the executor, which runs the retry loop. Failures
//! reach the pipeline only after the policy has given up.

use std::time::Duration;

use super::errors::TransportError;

/// Per-request retry decision state.
pub trait RetryPolicy: Send {
    /// Called after each failed attempt. `Some(delay)` retries after the
    /// delay; `None` surfaces the failure.
    fn should_retry(&mut self, error: &TransportError) -> Option<Duration>;
}

/// Produces a fresh [`RetryPolicy`] per request.
pub trait RetryPolicyFactory: Send + Sync {
    fn request_policy(&self) -> Box<dyn RetryPolicy>;
}

/// Policy that never retries. Useful as a factory default and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&mut self, _error: &TransportError) -> Option<Duration> {
        None
    }
}

impl RetryPolicyFactory for NoRetry {
    fn request_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(NoRetry)
    }
}
