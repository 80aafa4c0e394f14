//! Per-tick completion counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    remaining: AtomicUsize,
    notify: Notify,
}

/// Counter sized to the number of polls launched in one tick.
///
/// Each poll task holds a [`DoneGuard`]; dropping the guard counts the task
/// as done, so panics and early returns are counted too.
#[derive(Debug, Clone)]
pub struct TickCounter {
    inner: Arc<Inner>,
}

impl TickCounter {
    /// Create a counter expecting `count` completions.
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                remaining: AtomicUsize::new(count),
                notify: Notify::new(),
            }),
        }
    }

    /// Hand out a guard for one launched poll.
    pub fn guard(&self) -> DoneGuard {
        DoneGuard {
            counter: self.clone(),
        }
    }

    /// Completions still outstanding.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Wait until every expected completion has been posted.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn done(&self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.inner.notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("Tick counter released more times than it was sized for"),
        }
    }
}

/// Releases one slot of a [`TickCounter`] when dropped.
#[derive(Debug)]
pub struct DoneGuard {
    counter: TickCounter,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.counter.done();
    }
}
