//! Process-wide abort coordination.
//!
//! A single atomic flag plus a `Condvar` so a worker blocked between
//! scheduled calls wakes immediately when another worker trips the
//! flag (e.g. on an `abort_on` status match), instead of waiting out
//! its own sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    tripped: AtomicBool,
    gate: Mutex<()>,
    cv: Condvar,
}

/// Cheap to clone; all clones observe the same underlying flag.
#[derive(Debug, Clone)]
pub struct AbortFlag(Arc<Inner>);

impl AbortFlag {
    pub fn new() -> Self {
        Self(Arc::new(Inner::default()))
    }

    /// Idempotent: tripping an already-tripped flag is a no-op.
    pub fn abort(&self) {
        if !self.0.tripped.swap(true, Ordering::SeqCst) {
            let _guard = self.0.gate.lock().unwrap();
            self.0.cv.notify_all();
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.tripped.load(Ordering::SeqCst)
    }

    /// Sleep for up to `dur`, waking early if the flag trips. Returns
    /// `true` if woken by abort, `false` if the full duration elapsed.
    pub fn sleep_or_abort(&self, dur: Duration) -> bool {
        if dur.is_zero() {
            return self.is_set();
        }
        if self.is_set() {
            return true;
        }
        let guard = self.0.gate.lock().unwrap();
        if self.is_set() {
            return true;
        }
        let (_guard, timeout) = self.0.cv.wait_timeout(guard, dur).unwrap();
        !timeout.timed_out() || self.is_set()
    }
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}
