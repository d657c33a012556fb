//! Subscriber callback delivery.
//!
//! Two-level queue, mirroring the original's `SubscriberQueue` /
//! `SubscriberOverallQueue` pair: each subscriber owns a bounded deque of
//! boxed callbacks (oldest dropped first once the bound is hit), and every
//! callback is additionally handed to one process-wide queue as a weak
//! reference. A single thread drains the overall queue and invokes whichever
//! callbacks haven't since been dropped, so one dispatch thread services
//! every subscriber in the process without per-subscriber threads.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::warn;

type Callback = Box<dyn FnOnce() + Send>;

/// Process-wide queue of pending callbacks, referenced only weakly so a
/// subscriber queue can drop unprocessed callbacks (e.g. on overflow)
/// without the overall queue keeping them alive.
#[derive(Default)]
pub struct SubscriberOverallQueue {
    inner: Mutex<VecDeque<Weak<Mutex<Option<Callback>>>>>,
    cv: Condvar,
}

impl SubscriberOverallQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn add(&self, cb: &Arc<Mutex<Option<Callback>>>) {
        self.inner.lock().push_back(Arc::downgrade(cb));
        self.cv.notify_one();
    }

    /// Waits up to `max_sleep` for a callback to arrive, then drains and
    /// runs everything currently queued. Callbacks whose subscriber queue
    /// already dropped them (the `Weak` no longer upgrades) are skipped.
    pub fn process_callbacks(&self, max_sleep: Duration) {
        let mut guard = self.inner.lock();
        if guard.is_empty() {
            self.cv.wait_for(&mut guard, max_sleep);
        }
        if guard.is_empty() {
            return;
        }
        let drained: VecDeque<_> = std::mem::take(&mut *guard);
        drop(guard);

        for weak_cb in drained {
            if let Some(cb_slot) = weak_cb.upgrade() {
                if let Some(cb) = cb_slot.lock().take() {
                    cb();
                }
            }
        }
    }
}

/// Per-subscriber bounded callback queue. Overflow drops the oldest pending
/// callback, matching the original's `EnforceLimit`.
pub struct SubscriberQueue {
    overall: Arc<SubscriberOverallQueue>,
    limit: Mutex<usize>,
    callbacks: Mutex<VecDeque<Arc<Mutex<Option<Callback>>>>>,
}

impl SubscriberQueue {
    pub fn new(overall: Arc<SubscriberOverallQueue>, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            overall,
            limit: Mutex::new(limit),
            callbacks: Mutex::new(VecDeque::new()),
        })
    }

    pub fn set_limit(&self, limit: usize) {
        *self.limit.lock() = limit;
        self.enforce_limit();
    }

    /// Queues a callback for later dispatch by the overall queue's drain
    /// thread. A limit of `0` means unbounded.
    pub fn add_callback(&self, callback: impl FnOnce() + Send + 'static) {
        let slot = Arc::new(Mutex::new(Some(Box::new(callback) as Callback)));
        self.callbacks.lock().push_back(slot.clone());
        self.enforce_limit();
        self.overall.add(&slot);
    }

    fn enforce_limit(&self) {
        let limit = *self.limit.lock();
        if limit == 0 {
            return;
        }
        let mut callbacks = self.callbacks.lock();
        if callbacks.len() > limit {
            warn!(len = callbacks.len(), limit, "subscriber queue limit reached, dropping oldest");
        }
        while callbacks.len() > limit {
            callbacks.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn overflow_drops_oldest_without_invoking_it() {
        let overall = SubscriberOverallQueue::new();
        let sub = SubscriberQueue::new(overall, 2);
        let invoked = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let invoked = invoked.clone();
            sub.add_callback(move || invoked.lock().push(i));
        }
        assert_eq!(sub.len(), 2);
    }

    #[test]
    fn overall_queue_drains_and_runs_live_callbacks() {
        let overall = SubscriberOverallQueue::new();
        let sub = SubscriberQueue::new(overall.clone(), 0);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let count = count.clone();
            sub.add_callback(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        overall.process_callbacks(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn dropped_subscriber_queue_callbacks_are_skipped_not_run() {
        let overall = SubscriberOverallQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let sub = SubscriberQueue::new(overall.clone(), 0);
            let count = count.clone();
            sub.add_callback(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            // `sub` (and its callback slots) drops here.
        }
        overall.process_callbacks(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
