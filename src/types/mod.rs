//! Public façade types shared across the query pipeline.

pub mod document;
pub mod feed;
pub mod query;

pub use document::{document_rid, OrderByEnvelope};
pub use feed::{FeedOptions, FeedResponse, QueryMetrics};
pub use query::{SqlParameter, SqlQuery};
