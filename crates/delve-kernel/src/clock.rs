//! Injectable time source.
//!
//! Everything in the control layer that measures elapsed time or suspends
//! goes through a [`Clock`].  Production code uses [`SystemClock`]; tests use
//! [`ManualClock`], whose `sleep` advances virtual time instantly.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A monotonic time source that can also suspend the caller.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Time elapsed since `earlier`, saturating at zero.
    fn since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SystemClock
// ────────────────────────────────────────────────────────────────────────────

/// Wall-clock implementation backed by [`Instant::now`] and
/// [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ManualClock
// ────────────────────────────────────────────────────────────────────────────

/// Virtual clock for deterministic tests.
///
/// Time only moves when [`ManualClock::advance`] or [`Clock::sleep`] is
/// called, so a poll loop with a ten second timeout finishes instantly.
///
/// ```
/// use std::time::Duration;
/// use delve_kernel::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.sleep(Duration::from_secs(10));
/// assert_eq!(clock.since(start), Duration::from_secs(10));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move virtual time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += duration;
    }

    /// Total virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
