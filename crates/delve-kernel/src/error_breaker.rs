//! [`ErrorBreaker`] – consecutive-failure circuit breaker.
//!
//! Every task routine that judges an operation failed calls
//! [`ErrorBreaker::report_error`]; every routine that judges one successful
//! calls [`ErrorBreaker::reset`].  Failures decay with time: when more than
//! the reset window has passed since the previous failure, the count starts
//! over.  Once `max_consecutive` failures accumulate the breaker trips, runs
//! its stop action once, and stays tripped until reset.
//!
//! The orchestrator checks [`ErrorBreaker::is_tripped`] before every
//! scheduling pass, so a trip halts the automation without cancelling the
//! operation that is already in flight.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use delve_types::settings::BreakerSettings;
use tracing::{error, warn};

use crate::clock::Clock;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// State reported after a failure has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Still accepting work; `count` consecutive failures so far.
    Closed { count: u32 },
    /// The failure limit was reached; scheduling must stop.
    Tripped { count: u32 },
}

/// Action invoked once when the breaker trips.  Receives the reason of the
/// failure that tripped it.
pub type StopAction = Box<dyn FnMut(&str) + Send>;

// ────────────────────────────────────────────────────────────────────────────
// ErrorBreaker
// ────────────────────────────────────────────────────────────────────────────

/// Counts consecutive failures and halts automation when they pile up.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use delve_kernel::clock::ManualClock;
/// use delve_kernel::error_breaker::{BreakerState, ErrorBreaker};
///
/// let clock = Arc::new(ManualClock::new());
/// let mut breaker = ErrorBreaker::new(3, Duration::from_secs(60), clock);
///
/// breaker.report_error("door did not open");
/// breaker.report_error("door did not open");
/// assert_eq!(breaker.report_error("door did not open"), BreakerState::Tripped { count: 3 });
/// assert!(breaker.is_tripped());
///
/// breaker.reset();
/// assert!(!breaker.is_tripped());
/// ```
pub struct ErrorBreaker {
    max_consecutive: u32,
    reset_window: Duration,
    count: u32,
    last_error: Instant,
    tripped: bool,
    clock: Arc<dyn Clock>,
    on_trip: Option<StopAction>,
}

impl ErrorBreaker {
    /// Create a breaker that trips after `max_consecutive` failures, each
    /// within `reset_window` of the previous one.
    pub fn new(max_consecutive: u32, reset_window: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_error = clock.now();
        Self {
            max_consecutive,
            reset_window,
            count: 0,
            last_error,
            tripped: false,
            clock,
            on_trip: None,
        }
    }

    pub fn from_settings(settings: &BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        Self::new(settings.max_consecutive, settings.reset_window(), clock)
    }

    /// Install the global-stop action run when the breaker trips.
    pub fn with_stop_action(mut self, action: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_trip = Some(Box::new(action));
        self
    }

    /// Record a failure.
    ///
    /// The count is time-decayed first: if the previous failure is older
    /// than the reset window it starts over at zero.  Reaching the limit
    /// trips the breaker and runs the stop action (once per trip).
    pub fn report_error(&mut self, reason: &str) -> BreakerState {
        let now = self.clock.now();
        if now.saturating_duration_since(self.last_error) > self.reset_window {
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.last_error = now;

        if self.count >= self.max_consecutive {
            if !self.tripped {
                self.tripped = true;
                error!(
                    count = self.count,
                    reason,
                    "error breaker tripped; halting automation"
                );
                if let Some(action) = self.on_trip.as_mut() {
                    action(reason);
                }
            }
            return BreakerState::Tripped { count: self.count };
        }

        warn!(
            count = self.count,
            max = self.max_consecutive,
            reason,
            "operation failed"
        );
        BreakerState::Closed { count: self.count }
    }

    /// Zero the count, refresh the timestamp and clear any trip.
    pub fn reset(&mut self) {
        self.count = 0;
        self.last_error = self.clock.now();
        self.tripped = false;
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Failures recorded since the last reset or decay.
    pub fn consecutive_failures(&self) -> u32 {
        self.count
    }
}

impl fmt::Debug for ErrorBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBreaker")
            .field("max_consecutive", &self.max_consecutive)
            .field("reset_window", &self.reset_window)
            .field("count", &self.count)
            .field("tripped", &self.tripped)
            .field("on_trip", &self.on_trip.is_some())
            .finish()
    }
}
