//! Pull-based pipeline component trait.
//!
//! A component wraps its source and transforms the page stream. Repeated
//! `drain` calls yield the component's output pages; `None` is
//! end-of-stream and stays `None` on further calls.

use std::future::Future;
use std::pin::Pin;

use crate::types::feed::FeedResponse;

use super::errors::QueryResult;

/// Future type returned by [`QueryComponent::drain`].
pub type DrainFuture<'a> = Pin<Box<dyn Future<Output = QueryResult<Option<FeedResponse>>> + Send + 'a>>;

/// One stage of the query pipeline.
pub trait QueryComponent: Send {
    /// Produces the next page of at most `max_page_size` items, pulling
    /// from the wrapped source as needed.
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_>;
}
