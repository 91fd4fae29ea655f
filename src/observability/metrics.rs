//! Operation counters for the query pipeline.
//!
//! Counters only, monotonic, reset on process start. Relaxed atomics:
//! metrics tolerate eventual consistency and must never contend with the
//! pipeline itself.

use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of pipeline counters. One instance is shared by every query
/// issued through the same client.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_started: AtomicU64,
    queries_completed: AtomicU64,
    queries_failed: AtomicU64,
    continuations_resumed: AtomicU64,
    pages_fetched: AtomicU64,
    documents_fetched: AtomicU64,
    pages_emitted: AtomicU64,
    documents_emitted: AtomicU64,
    splits_resolved: AtomicU64,
    fetch_failures: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_started(&self) {
        self.queries_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_completed(&self) {
        self.queries_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_continuations_resumed(&self) {
        self.continuations_resumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pages_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_fetched(&self, count: u64) {
        self.documents_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_pages_emitted(&self) {
        self.pages_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_emitted(&self, count: u64) {
        self.documents_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_splits_resolved(&self) {
        self.splits_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queries_started(&self) -> u64 {
        self.queries_started.load(Ordering::Relaxed)
    }

    pub fn queries_completed(&self) -> u64 {
        self.queries_completed.load(Ordering::Relaxed)
    }

    pub fn queries_failed(&self) -> u64 {
        self.queries_failed.load(Ordering::Relaxed)
    }

    pub fn continuations_resumed(&self) -> u64 {
        self.continuations_resumed.load(Ordering::Relaxed)
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn documents_fetched(&self) -> u64 {
        self.documents_fetched.load(Ordering::Relaxed)
    }

    pub fn pages_emitted(&self) -> u64 {
        self.pages_emitted.load(Ordering::Relaxed)
    }

    pub fn documents_emitted(&self) -> u64 {
        self.documents_emitted.load(Ordering::Relaxed)
    }

    pub fn splits_resolved(&self) -> u64 {
        self.splits_resolved.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.queries_started(), 0);
        assert_eq!(metrics.pages_fetched(), 0);
        assert_eq!(metrics.splits_resolved(), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsRegistry::new();
        metrics.increment_queries_started();
        metrics.increment_queries_started();
        metrics.increment_pages_fetched();
        metrics.add_documents_fetched(5);
        metrics.add_documents_emitted(3);

        assert_eq!(metrics.queries_started(), 2);
        assert_eq!(metrics.pages_fetched(), 1);
        assert_eq!(metrics.documents_fetched(), 5);
        assert_eq!(metrics.documents_emitted(), 3);
    }
}
