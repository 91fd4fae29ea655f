//! Unordered DISTINCT component: hash-based dedup across partitions.
//!
//! Fingerprints are the first eight bytes of a SHA-256 over the item's
//! canonical serialization, so they are stable across processes and safe
//! to persist in continuation tokens. The continuation carries the full
//! fingerprint set; a resumed query never re-emits an item it already
//! surfaced.

use std::collections::HashSet;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::feed::FeedResponse;

use super::component::{DrainFuture, QueryComponent};
use super::errors::{QueryError, QueryResult};
use super::ordering::canonical;

/// Stable 64-bit fingerprint of a JSON value.
pub fn fingerprint(value: &Value) -> u64 {
    let digest = Sha256::digest(canonical(value).as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest has at least 8 bytes"))
}

/// Filters out items whose fingerprint was already seen.
pub struct DistinctComponent {
    source: Box<dyn QueryComponent>,
    seen: HashSet<u64>,
}

impl DistinctComponent {
    pub fn new(source: Box<dyn QueryComponent>) -> Self {
        Self {
            source,
            seen: HashSet::new(),
        }
    }

    /// Restores the seen set from a continuation's hex fingerprints.
    pub fn with_state(source: Box<dyn QueryComponent>, state: &[String]) -> QueryResult<Self> {
        let mut seen = HashSet::with_capacity(state.len());
        for hex in state {
            let value = u64::from_str_radix(hex, 16).map_err(|_| {
                QueryError::InvalidContinuation(format!("bad distinct fingerprint {hex:?}"))
            })?;
            seen.insert(value);
        }
        Ok(Self { source, seen })
    }

    fn state(&self) -> Vec<String> {
        let mut fingerprints: Vec<String> =
            self.seen.iter().map(|v| format!("{v:016x}")).collect();
        fingerprints.sort();
        fingerprints
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        let Some(mut page) = self.source.drain(max_page_size).await? else {
            return Ok(None);
        };
        page.items.retain(|item| self.seen.insert(fingerprint(item)));
        if let Some(continuation) = &mut page.continuation {
            continuation.outer.distinct_state = Some(self.state());
        }
        Ok(Some(page))
    }
}

impl QueryComponent for DistinctComponent {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::pages_component;
    use serde_json::json;

    #[test]
    fn test_fingerprint_key_order_independent() {
        let a = json!({"x": 1, "y": [true, null]});
        let b = json!({"y": [true, null], "x": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&json!({"x": 1, "y": [null, true]})));
    }

    #[tokio::test]
    async fn test_dedup_across_pages() {
        let source = pages_component(vec![
            vec![json!({"id": "a"}), json!({"id": "b"})],
            vec![json!({"id": "b"}), json!({"id": "c"})],
        ]);
        let mut distinct = DistinctComponent::new(source);

        let first = distinct.drain(2).await.unwrap().unwrap();
        assert_eq!(first.items.len(), 2);
        let state = first
            .continuation
            .as_ref()
            .unwrap()
            .outer
            .distinct_state
            .clone()
            .unwrap();
        assert_eq!(state.len(), 2);

        let second = distinct.drain(2).await.unwrap().unwrap();
        assert_eq!(second.items, vec![json!({"id": "c"})]);
    }

    #[tokio::test]
    async fn test_resume_suppresses_seen_items() {
        let source = pages_component(vec![vec![json!({"id": "a"}), json!({"id": "b"})]]);
        let state = vec![format!("{:016x}", fingerprint(&json!({"id": "a"})))];
        let mut distinct = DistinctComponent::with_state(source, &state).unwrap();

        let page = distinct.drain(2).await.unwrap().unwrap();
        assert_eq!(page.items, vec![json!({"id": "b"})]);
    }

    #[test]
    fn test_bad_state_rejected() {
        let source = pages_component(vec![]);
        assert!(DistinctComponent::with_state(source, &["zz".to_string()]).is_err());
    }
}
