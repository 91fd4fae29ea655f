//! Request-execution collaborator boundary.
//!
//! The core never speaks the wire protocol itself: it builds
//! [`DocumentServiceRequest`]s and hands them to an injected
//! [`RequestExecutor`], which applies the retry policy and returns a
//! single [`ProducerPage`] or a typed [`errors::TransportError`] once
//! retries are exhausted.

pub mod errors;
pub mod executor;
pub mod request;
pub mod retry;

pub use errors::{TransportError, TransportResult};
pub use executor::{ExecuteFuture, ProducerPage, RequestExecutor};
pub use request::DocumentServiceRequest;
pub use retry::{NoRetry, RetryPolicy, RetryPolicyFactory};
