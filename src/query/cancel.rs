//! Cooperative cancellation for one query execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cancellation signal shared between a query stream and its producers.
///
/// Checked at every suspension point; an in-flight fetch is abandoned by
/// dropping its future, so cancellation never waits for an RPC to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags the query as cancelled and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            // Register before the flag re-check, so a cancel landing in
            // between still wakes this waiter.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
