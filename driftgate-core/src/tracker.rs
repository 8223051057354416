//! In-flight connection bookkeeping.
//!
//! [`ConnectionTracker`] is a counter paired with a completion barrier. Every
//! dispatched connection holds a [`ConnectionGuard`]; the count drops when the
//! guard does, so the slot is released on every exit path of a worker,
//! including a panicking handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicUsize,
    drained: Notify,
}

/// Thread-safe count of active connections with an async wait-for-zero.
///
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<Inner>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work.
    ///
    /// Must be called before the work is dispatched. The returned guard
    /// deregisters it when dropped.
    #[must_use = "dropping the guard immediately releases the connection slot"]
    pub fn add(&self) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        crate::metrics::connection_opened();
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Snapshot of `active() > 0`.
    ///
    /// Concurrent `add`/drop may change the answer before the caller acts on
    /// it; treat it as a heuristic only.
    pub fn has_active(&self) -> bool {
        self.active() > 0
    }

    /// Number of guards currently alive.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until every outstanding guard has been dropped.
    ///
    /// Completes immediately when nothing is registered. New guards created
    /// while waiting extend the wait.
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // Register interest before reading the count so a concurrent
            // final drop cannot slip between the check and the await.
            drained.as_mut().enable();

            if self.active() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Registration of one in-flight connection. Dropping it is the matching
/// "done" for the [`ConnectionTracker::add`] that created it.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.inner.active.fetch_sub(1, Ordering::SeqCst);
        crate::metrics::connection_closed();
        if prev == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
