//! Versioned cross-partition continuation tokens.

pub mod codec;

pub use codec::{
    CompositeContinuation, ContinuationError, OrderByState, OuterState, RangeContinuation,
    RangeSeed, CONTINUATION_VERSION,
};
