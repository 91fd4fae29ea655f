//! Per-partition buffered page producer.
//!
//! A producer owns the fetch cursor and look-ahead buffer for one
//! partition key range. It is a passive state machine: the owning pool
//! starts fetches, applies their results, and replaces the producer with
//! children when its range splits.
//!
//! Two cursors are tracked. The fetch cursor is the token for the next
//! server request and advances as pages are buffered. The resume cursor
//! is the consumer's position: the continuation of the last page handed
//! downstream. Continuation tokens and split reseeding use the resume
//! cursor, so prefetched-but-unconsumed pages are never skipped on
//! resume; on split they are discarded and refetched by the children.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::continuation::codec::OrderByState;
use crate::routing::range::PartitionKeyRange;
use crate::transport::executor::ProducerPage;

/// Observable producer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// No data buffered, no fetch outstanding.
    Idle,
    /// A fetch is outstanding.
    Fetching,
    /// At least one page is buffered.
    HasData,
    /// The range's feed ended and the buffer is drained.
    Exhausted,
    /// The range is gone; the pool must replace this producer.
    Split,
    /// A fetch failed after retries.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    InFlight,
    Exhausted,
    Split,
    Failed,
}

/// Buffered, prefetching page stream for one partition key range.
#[derive(Debug)]
pub struct DocumentProducer {
    target_range: PartitionKeyRange,
    fetch_continuation: Option<String>,
    resume_continuation: Option<String>,
    resume_exhausted: bool,
    order_resume: Option<OrderByState>,
    buffered: VecDeque<ProducerPage>,
    buffered_item_count: usize,
    fetch: FetchState,
    last_activity_id: Option<Uuid>,
}

impl DocumentProducer {
    pub fn new(target_range: PartitionKeyRange) -> Self {
        Self::with_seed(target_range, None, None)
    }

    /// Creates a producer resuming from a continuation seed.
    pub fn with_seed(
        target_range: PartitionKeyRange,
        token: Option<String>,
        order_resume: Option<OrderByState>,
    ) -> Self {
        Self {
            target_range,
            fetch_continuation: token.clone(),
            resume_continuation: token,
            resume_exhausted: false,
            order_resume,
            buffered: VecDeque::new(),
            buffered_item_count: 0,
            fetch: FetchState::Idle,
            last_activity_id: None,
        }
    }

    pub fn range(&self) -> &PartitionKeyRange {
        &self.target_range
    }

    pub fn order_resume(&self) -> Option<&OrderByState> {
        self.order_resume.as_ref()
    }

    pub fn state(&self) -> ProducerState {
        match self.fetch {
            FetchState::Split => ProducerState::Split,
            FetchState::Failed => ProducerState::Failed,
            _ if !self.buffered.is_empty() => ProducerState::HasData,
            FetchState::InFlight => ProducerState::Fetching,
            FetchState::Exhausted => ProducerState::Exhausted,
            FetchState::Idle => ProducerState::Idle,
        }
    }

    pub fn has_buffered(&self) -> bool {
        !self.buffered.is_empty()
    }

    pub fn buffered_item_count(&self) -> usize {
        self.buffered_item_count
    }

    /// True once the server feed for this range has ended. The buffer may
    /// still hold pages.
    pub fn fetch_exhausted(&self) -> bool {
        self.fetch == FetchState::Exhausted
    }

    /// True when everything the range will ever produce has been handed
    /// downstream.
    pub fn is_drained(&self) -> bool {
        self.fetch == FetchState::Exhausted && self.buffered.is_empty()
    }

    /// True when this producer can accept a new outstanding fetch.
    pub fn can_start_fetch(&self) -> bool {
        self.fetch == FetchState::Idle
    }

    /// Token for the next server request.
    pub fn fetch_continuation(&self) -> Option<&str> {
        self.fetch_continuation.as_deref()
    }

    /// Token to put in a composite continuation: the consumer's position.
    pub fn resume_continuation(&self) -> Option<&str> {
        self.resume_continuation.as_deref()
    }

    /// True when the consumer has received this range's final page.
    pub fn resume_exhausted(&self) -> bool {
        self.resume_exhausted
    }

    pub fn last_activity_id(&self) -> Option<Uuid> {
        self.last_activity_id
    }

    /// Head of the buffer, without consuming it.
    pub fn peek(&self) -> Option<&ProducerPage> {
        self.buffered.front()
    }

    /// Marks a fetch outstanding.
    pub fn begin_fetch(&mut self) {
        debug_assert_eq!(self.fetch, FetchState::Idle, "one outstanding fetch per range");
        self.fetch = FetchState::InFlight;
    }

    /// Buffers a fetched page and advances the fetch cursor.
    pub fn apply_page(&mut self, page: ProducerPage) {
        debug_assert_eq!(self.fetch, FetchState::InFlight);
        self.last_activity_id = Some(page.activity_id);
        self.fetch_continuation = page.continuation.clone();
        self.fetch = if page.continuation.is_none() {
            FetchState::Exhausted
        } else {
            FetchState::Idle
        };
        self.buffered_item_count += page.item_count();
        self.buffered.push_back(page);
    }

    /// Marks the outstanding fetch as failed with range-gone.
    pub fn mark_split(&mut self) {
        self.fetch = FetchState::Split;
    }

    /// Marks the outstanding fetch as failed fatally.
    pub fn mark_failed(&mut self) {
        self.fetch = FetchState::Failed;
    }

    /// Hands the next buffered page downstream, advancing the resume
    /// cursor to the page's continuation.
    pub fn pop_page(&mut self) -> Option<ProducerPage> {
        let page = self.buffered.pop_front()?;
        self.buffered_item_count -= page.item_count();
        self.resume_continuation = page.continuation.clone();
        if page.continuation.is_none() {
            self.resume_exhausted = true;
        }
        Some(page)
    }

    /// Builds the replacement producers after this range split.
    ///
    /// Children resume from the consumer's position; prefetched pages are
    /// dropped and refetched through the children's own feeds.
    pub fn split_children(&self, children: Vec<PartitionKeyRange>) -> Vec<DocumentProducer> {
        let parent_id = &self.target_range.id;
        children
            .into_iter()
            .map(|mut child| {
                if !child.parents.iter().any(|p| p == parent_id) {
                    child.parents.push(parent_id.clone());
                }
                Self::with_seed(
                    child,
                    self.resume_continuation.clone(),
                    self.order_resume.clone(),
                )
            })
            .collect()
    }
}
