//! stratus-client: client library for the Stratus partitioned document
//! database.
//!
//! This crate holds the cross-partition query execution pipeline: it
//! turns one logical SQL query against a horizontally partitioned
//! collection into per-partition page streams, then merges, aggregates,
//! and paginates them back into a single ordered, resumable feed.
//!
//! Transport, routing lookup, retry policies, and query planning are
//! collaborator traits injected at pipeline construction; see
//! [`query::PipelineDeps`].

pub mod continuation;
pub mod observability;
pub mod planner;
pub mod query;
pub mod routing;
pub mod transport;
pub mod types;

pub use query::{execute_query, CancellationSignal, PipelineDeps, QueryError, QueryResult, QueryStream};
pub use types::{FeedOptions, FeedResponse, SqlQuery};
