//! Monotonic time, with an optional simulated-time override.
//!
//! Mirrors `basis::core::MonotonicTime` from the original implementation:
//! nanosecond-resolution, monotonic, non-decreasing, with a global
//! simulated-time override used by the replayer (and by tests) to drive
//! time without sleeping in real wall-clock terms. A `run_token` tags each
//! simulation run so that sleeps started under an earlier run return
//! immediately once a newer run begins, rather than sleeping against a time
//! axis that no longer applies.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Sentinel written into the packet header's `send_time` field when the
/// sender didn't stamp one. Matches the original's `0xFFFFFFFF` literal.
pub const UNSET_SEND_TIME: u64 = 0xFFFF_FFFF;

static SIMULATED_TIME_NS: AtomicU64 = AtomicU64::new(u64::MAX);
static RUN_TOKEN: AtomicU64 = AtomicU64::new(0);

static SIM_TIME_CHANGED: Mutex<()> = Mutex::new(());
static SIM_TIME_CV: Condvar = Condvar::new();

/// A monotonic timestamp, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTime {
    pub nsecs: u64,
}

impl MonotonicTime {
    pub fn from_nanos(nsecs: u64) -> Self {
        Self { nsecs }
    }

    pub fn from_secs_f64(seconds: f64) -> Self {
        Self {
            nsecs: (seconds * 1_000_000_000.0) as u64,
        }
    }

    /// Current time: the simulated clock if one is active, otherwise the
    /// real monotonic clock.
    pub fn now() -> Self {
        if let Some(sim) = Self::simulated_nsecs() {
            return Self { nsecs: sim };
        }
        Self::now_real()
    }

    fn now_real() -> Self {
        // `Instant` has no epoch we can read back out as nanoseconds, so we
        // anchor against `SystemTime` — monotonicity within a process run
        // is all that's needed here, not across reboots.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            nsecs: now.as_nanos() as u64,
        }
    }

    fn simulated_nsecs() -> Option<u64> {
        let v = SIMULATED_TIME_NS.load(Ordering::SeqCst);
        if v == u64::MAX {
            None
        } else {
            Some(v)
        }
    }

    pub fn using_simulated_time() -> bool {
        Self::simulated_nsecs().is_some()
    }

    /// Installs a simulated time and advances the run token, cancelling any
    /// sleep started under a previous token.
    pub fn set_simulated_time(nsecs: u64, run_token: u64) {
        SIMULATED_TIME_NS.store(nsecs, Ordering::SeqCst);
        RUN_TOKEN.store(run_token, Ordering::SeqCst);
        let _guard = SIM_TIME_CHANGED.lock();
        SIM_TIME_CV.notify_all();
    }

    pub fn clear_simulated_time() {
        SIMULATED_TIME_NS.store(u64::MAX, Ordering::SeqCst);
        let _guard = SIM_TIME_CHANGED.lock();
        SIM_TIME_CV.notify_all();
    }

    pub fn run_token() -> u64 {
        RUN_TOKEN.load(Ordering::SeqCst)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.nsecs as f64 / 1_000_000_000.0
    }

    /// Blocks until `self` is reached, under the given `run_token`. If
    /// simulated time is active, returns early the instant the token
    /// changes (a new simulation run superseding this sleep) rather than
    /// waiting out the full duration against a stale clock.
    pub fn sleep_until(&self, run_token: u64) {
        if !Self::using_simulated_time() {
            let now = Self::now_real();
            if self.nsecs > now.nsecs {
                std::thread::sleep(Duration::from_nanos(self.nsecs - now.nsecs));
            }
            return;
        }

        loop {
            if Self::run_token() != run_token {
                return;
            }
            if Self::now().nsecs >= self.nsecs {
                return;
            }
            let mut guard = SIM_TIME_CHANGED.lock();
            SIM_TIME_CV.wait_for(&mut guard, Duration::from_millis(50));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering as O};
    use std::sync::Arc;

    #[test]
    fn simulated_time_overrides_now() {
        MonotonicTime::set_simulated_time(42, 1);
        assert_eq!(MonotonicTime::now().nsecs, 42);
        MonotonicTime::clear_simulated_time();
        assert!(!MonotonicTime::using_simulated_time());
    }

    #[test]
    fn sleep_cancelled_by_new_run_token() {
        MonotonicTime::set_simulated_time(0, 100);
        let target = MonotonicTime::from_nanos(1_000_000_000_000);

        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        let handle = std::thread::spawn(move || {
            target.sleep_until(100);
            done_clone.store(true, O::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(20));
        assert!(!done.load(O::SeqCst));

        MonotonicTime::set_simulated_time(0, 101);
        handle.join().unwrap();
        assert!(done.load(O::SeqCst));
        MonotonicTime::clear_simulated_time();
    }
}
