//! [`WakeEvent`] — the single-writer/single-reader signal that lets the
//! [`crate::realtime::RealtimeWakeupService`] break a [`crate::worker::WorkerLoop`]'s
//! idle sleep (spec §4.4, §4.5).
//!
//! Built on `tokio::sync::Notify` rather than a bare `AtomicBool` so the
//! loop can wait on it directly instead of busy-polling; the loop still
//! ticks on a timeout so it can also observe the shutdown flag and the
//! backoff deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

/// Cloning shares the same underlying flag: the realtime service holds one
/// clone (the writer), the worker loop holds another (the reader).
#[derive(Debug, Clone, Default)]
pub struct WakeEvent {
    inner: Arc<Inner>,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the event set and wake anyone parked in [`WakeEvent::wait`].
    /// Idempotent: firing twice before a reader clears it is a no-op past
    /// the first call.
    pub fn set(&self) {
        self.inner.set.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Clear the event without waiting. Called at the start of an idle
    /// sleep so a stale set from before the sleep began doesn't fire it
    /// immediately.
    pub fn clear(&self) {
        self.inner.set.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Identity comparison for registry bookkeeping: two clones of the same
    /// `WakeEvent` are equal, two independently constructed ones are not.
    pub fn ptr_eq(&self, other: &WakeEvent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Park until `set()` is called, then clear and return. Used by tests
    /// and by any caller that doesn't need the loop's own tick-based
    /// polling; the production WorkerLoop polls `is_set` on a tick instead
    /// so it can also observe the shutdown flag in the same loop.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.set.swap(false, Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
