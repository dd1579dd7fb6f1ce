//! [`Orchestrator`] – priority-ordered cooperative task scheduler.
//!
//! Each call to [`Orchestrator::execute`] is one scheduling pass:
//!
//! 1. If the [`ErrorBreaker`] has tripped, return [`TickOutcome::Halted`]
//!    without looking at anything.
//! 2. Capture a fresh [`ExecutionContext`].
//! 3. Evaluate eligibility predicates in registration order and run the
//!    first eligible task's routine once.
//!
//! Errors returned by a routine and panics raised inside it stop at this
//! boundary: both become [`TickOutcome::Failed`] and are reported to the
//! breaker, a panic as [`DelveError::TaskFault`].  A routine returning
//! [`TaskStatus::Success`] resets the breaker.  Once tripped,
//! [`Orchestrator::health`] reports [`DelveError::Systemic`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use delve_hal::SimClient;
//! use delve_kernel::{ErrorBreaker, ManualClock};
//! use delve_runtime::orchestrator::{Orchestrator, TickOutcome};
//!
//! let clock = Arc::new(ManualClock::new());
//! let client = Arc::new(SimClient::builder(clock.clone()).build());
//! let breaker = ErrorBreaker::new(10, Duration::from_secs(120), clock.clone());
//! let mut orchestrator = Orchestrator::new(client, clock, breaker);
//!
//! // Nothing registered: nothing to do.
//! assert_eq!(orchestrator.execute(), TickOutcome::Idle);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use delve_hal::GameClient;
use delve_kernel::{Clock, ErrorBreaker};
use delve_pricing::PriceCache;
use delve_types::DelveError;
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::task::{Task, TaskServices, TaskStatus};

/// Result of one scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No task was eligible.
    Idle,
    /// A task ran and returned a status.
    Ran { task: String, status: TaskStatus },
    /// A task returned an error or panicked; the breaker was notified.
    Failed { task: String, error: DelveError },
    /// The breaker is tripped; nothing was evaluated.
    Halted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the first eligible registered task once per tick.
pub struct Orchestrator {
    tasks: Vec<Box<dyn Task>>,
    client: Arc<dyn GameClient>,
    clock: Arc<dyn Clock>,
    breaker: ErrorBreaker,
    prices: Option<PriceCache>,
    ticks: u64,
    session: Uuid,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn GameClient>, clock: Arc<dyn Clock>, breaker: ErrorBreaker) -> Self {
        Self {
            tasks: Vec::new(),
            client,
            clock,
            breaker,
            prices: None,
            ticks: 0,
            session: Uuid::new_v4(),
        }
    }

    /// Attach the reference price cache passed to tasks.
    pub fn with_prices(mut self, prices: PriceCache) -> Self {
        self.prices = Some(prices);
        self
    }

    /// Append `task`.  Registration order is priority order.
    pub fn register(&mut self, task: impl Task + 'static) {
        self.register_boxed(Box::new(task));
    }

    pub fn register_boxed(&mut self, task: Box<dyn Task>) {
        debug!(task = task.name(), priority = self.tasks.len(), "task registered");
        self.tasks.push(task);
    }

    /// Names of the registered tasks, highest priority first.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn breaker(&self) -> &ErrorBreaker {
        &self.breaker
    }

    /// Mutable access, e.g. to [`reset`][ErrorBreaker::reset] after an
    /// operator has intervened.
    pub fn breaker_mut(&mut self) -> &mut ErrorBreaker {
        &mut self.breaker
    }

    /// Scheduling passes that evaluated tasks (halted passes excluded).
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Identifier attached to every tick span of this orchestrator.
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// `Err(DelveError::Systemic)` once the breaker has tripped.
    pub fn health(&self) -> Result<(), DelveError> {
        if self.breaker.is_tripped() {
            return Err(DelveError::Systemic(format!(
                "error breaker tripped after {} consecutive failures",
                self.breaker.consecutive_failures()
            )));
        }
        Ok(())
    }

    /// One scheduling pass.
    pub fn execute(&mut self) -> TickOutcome {
        if self.breaker.is_tripped() {
            return TickOutcome::Halted;
        }

        self.ticks += 1;
        let span = info_span!("tick", session = %self.session, tick = self.ticks);
        let _enter = span.enter();

        let ctx = ExecutionContext::capture(self.client.as_ref(), self.prices.as_ref(), self.ticks);
        let Some(index) = self.tasks.iter().position(|t| t.is_eligible(&ctx)) else {
            return TickOutcome::Idle;
        };

        let task = &mut self.tasks[index];
        let name = task.name().to_string();
        let mut services = TaskServices {
            client: self.client.as_ref(),
            clock: self.clock.as_ref(),
            breaker: &mut self.breaker,
            prices: self.prices.as_ref(),
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| task.execute(&ctx, &mut services)));
        match result {
            Ok(Ok(status)) => {
                debug!(task = %name, ?status, "task ran");
                if status == TaskStatus::Success {
                    self.breaker.reset();
                }
                TickOutcome::Ran { task: name, status }
            }
            Ok(Err(error)) => {
                warn!(task = %name, %error, "task returned an error");
                self.breaker.report_error(&format!("{name}: {error}"));
                TickOutcome::Failed { task: name, error }
            }
            Err(payload) => {
                let error = DelveError::TaskFault {
                    task: name.clone(),
                    details: format!("panicked: {}", panic_message(payload.as_ref())),
                };
                error!(task = %name, %error, "task panicked");
                self.breaker.report_error(&error.to_string());
                TickOutcome::Failed { task: name, error }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
