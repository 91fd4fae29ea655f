//! Request executor trait and the page unit it returns.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use uuid::Uuid;

use crate::types::feed::QueryMetrics;

use super::errors::TransportResult;
use super::request::DocumentServiceRequest;
use super::retry::RetryPolicy;

/// Future type returned by [`RequestExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = TransportResult<ProducerPage>> + Send + 'a>>;

/// One server page for one partition key range.
///
/// Consumed exactly once as it flows up the pipeline.
#[derive(Debug, Clone)]
pub struct ProducerPage {
    pub items: Vec<Value>,
    /// Token fetching the page after this one; `None` ends the range's feed.
    pub continuation: Option<String>,
    pub request_charge: f64,
    pub activity_id: Uuid,
    pub query_metrics: HashMap<String, QueryMetrics>,
    pub source_range_id: String,
}

impl ProducerPage {
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Executes single-page requests, applying the supplied retry policy.
///
/// Implementations own routing-address resolution, the wire protocol, and
/// the retry loop; the pipeline only ever sees a page or a post-retry
/// [`super::errors::TransportError`].
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, request: DocumentServiceRequest, retry_policy: Box<dyn RetryPolicy>) -> ExecuteFuture<'_>;
}
