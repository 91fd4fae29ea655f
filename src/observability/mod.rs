//! Client-side observability: structured logs and operation counters.

pub mod logger;
pub mod metrics;

pub use logger::{Logger, Severity};
pub use metrics::MetricsRegistry;
