//! Skip component: drops the first K items (OFFSET clause).

use std::collections::HashMap;

use crate::types::feed::{FeedResponse, QueryMetrics};

use super::component::{DrainFuture, QueryComponent};
use super::errors::QueryResult;

/// Drops the first `remaining` items across source pages. The first page
/// it emits may be the merged tail of several source pages; charges and
/// metrics of fully-skipped pages are folded into it.
pub struct SkipComponent {
    source: Box<dyn QueryComponent>,
    remaining: u64,
    activity_id: uuid::Uuid,
    done: bool,
}

impl SkipComponent {
    pub fn new(source: Box<dyn QueryComponent>, count: u64, activity_id: uuid::Uuid) -> Self {
        Self {
            source,
            remaining: count,
            activity_id,
            done: false,
        }
    }

    async fn next_page(&mut self, max_page_size: usize) -> QueryResult<Option<FeedResponse>> {
        if self.done {
            return Ok(None);
        }

        let mut carried_charge = 0.0;
        let mut carried_metrics: HashMap<String, QueryMetrics> = HashMap::new();

        loop {
            let Some(mut page) = self.source.drain(max_page_size).await? else {
                self.done = true;
                // Source ended while still skipping; surface the consumed
                // charge on a final empty page rather than dropping it.
                if carried_charge > 0.0 {
                    return Ok(Some(FeedResponse {
                        items: Vec::new(),
                        continuation: None,
                        request_charge: carried_charge,
                        query_metrics: carried_metrics,
                        activity_id: self.activity_id,
                    }));
                }
                return Ok(None);
            };

            if self.remaining > 0 && (page.items.len() as u64) <= self.remaining {
                self.remaining -= page.items.len() as u64;
                carried_charge += page.request_charge;
                QueryMetrics::merge_map(&mut carried_metrics, &page.query_metrics);
                continue;
            }

            page.items.drain(..self.remaining as usize);
            self.remaining = 0;
            page.request_charge += carried_charge;
            QueryMetrics::merge_map(&mut page.query_metrics, &carried_metrics);
            if let Some(continuation) = &mut page.continuation {
                continuation.outer.skip_remaining = Some(0);
            }
            return Ok(Some(page));
        }
    }
}

impl QueryComponent for SkipComponent {
    fn drain(&mut self, max_page_size: usize) -> DrainFuture<'_> {
        Box::pin(self.next_page(max_page_size))
    }
}
