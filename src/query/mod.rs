//! Cross-partition query execution pipeline.
//!
//! A logical query fans out into one buffered, prefetching producer per
//! partition key range. The base context (parallel or ORDER BY merge)
//! recombines the per-range streams, and the outer components cap, skip,
//! dedup, or fold the result. Every emitted page carries a composite
//! continuation that resumes the query across routing changes.

pub mod aggregate;
pub mod cancel;
pub mod component;
pub mod distinct;
pub mod errors;
pub mod orderby;
pub mod ordering;
pub mod parallel;
pub mod pipeline;
pub mod pool;
pub mod producer;
pub mod skip;
pub mod take;

#[cfg(test)]
pub mod testing;

pub use cancel::CancellationSignal;
pub use component::QueryComponent;
pub use errors::{QueryError, QueryResult};
pub use pipeline::{execute_query, PipelineDeps, QueryStream};
pub use producer::{DocumentProducer, ProducerState};
