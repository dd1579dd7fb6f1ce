//! Bounded polling primitive.
//!
//! [`wait_for`] is the only loop in the control layer that waits on the
//! external client.  It never blocks longer than `timeout` plus one
//! `interval`, and every timeout guarantee elsewhere is built on that.

use std::time::Duration;

use crate::clock::Clock;

/// Interval/timeout pair for a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSpec {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Evaluate `condition` until it holds or `timeout` elapses.
///
/// Sleeps `interval` on `clock` between evaluations.  Returns `true` as soon
/// as the condition holds and `false` once the deadline has been reached; the
/// condition gets one last evaluation at the deadline.
///
/// ```
/// use std::time::Duration;
/// use delve_kernel::clock::ManualClock;
/// use delve_kernel::wait::wait_for;
///
/// let clock = ManualClock::new();
/// let mut polls = 0;
/// let ok = wait_for(&clock, Duration::from_millis(100), Duration::from_secs(1), || {
///     polls += 1;
///     polls == 3
/// });
/// assert!(ok);
/// assert_eq!(clock.elapsed(), Duration::from_millis(200));
/// ```
pub fn wait_for<C, F>(clock: &C, interval: Duration, timeout: Duration, mut condition: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let start = clock.now();
    loop {
        if condition() {
            return true;
        }
        if clock.since(start) >= timeout {
            return false;
        }
        clock.sleep(interval);
    }
}

/// [`wait_for`] with the durations taken from a [`PollSpec`].
pub fn wait_with<C, F>(clock: &C, spec: PollSpec, condition: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    wait_for(clock, spec.interval, spec.timeout, condition)
}
