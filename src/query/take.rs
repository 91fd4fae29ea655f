//! Take component: hard-caps the item count (TOP and LIMIT clauses).

use crate::types::feed::FeedResponse;

use super::component::{DrainFuture, QueryComponent};
use super::errors::QueryResult;

/// Which clause this cap implements; decides the continuation field the
/// remaining count is persisted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeKind {
    Top,
    Limit,
}

/// Caps the stream at `remaining` items, then stops pulling upstream.
pub struct TakeComponent {
    source: Box<dyn QueryComponent>,
    kind: TakeKind,
    remaining: u64,
    done: bool,
}

impl TakeComponent {
    pub fn new(source: Box<dyn QueryComponent>, kind: TakeKind, count: u64) -> Self {
        Self {
            source,
            kind,
            remaining: count,
            done: false,
        }
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        if self.done || self.remaining == 0 {
            self.done = true;
            return Ok(None);
        }

        let pull = max_page_size.min(self.remaining as usize).max(1);
        let Some(mut page) = self.source.drain(pull).await? else {
            self.done = true;
            return Ok(None);
        };

        if page.items.len() as u64 >= self.remaining {
            page.items.truncate(self.remaining as usize);
            self.remaining = 0;
            self.done = true;
            // The cap is reached: this is the final page.
            page.continuation = None;
        } else {
            self.remaining -= page.items.len() as u64;
            if let Some(continuation) = &mut page.continuation {
                match self.kind {
                    TakeKind::Top => continuation.outer.top_remaining = Some(self.remaining),
                    TakeKind::Limit => continuation.outer.limit_remaining = Some(self.remaining),
                }
            }
        }
        Ok(Some(page))
    }
}

impl QueryComponent for TakeComponent {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}
