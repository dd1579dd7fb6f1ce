//! The [`Task`] trait and the services handed to a running task.
//!
//! A task pairs a side-effect-free eligibility predicate with a routine that
//! performs at most one tick's worth of work.  Long-running behaviour is
//! expressed as an explicit stage machine stored inside the task and
//! re-entered on the next tick, so an earlier-registered task can always
//! preempt it in between.

use delve_hal::GameClient;
use delve_kernel::{Clock, ErrorBreaker};
use delve_pricing::PriceCache;
use delve_types::DelveError;

use crate::context::ExecutionContext;

// ─────────────────────────────────────────────────────────────────────────────
// TaskStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Status returned by a task routine after a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task reached its goal.  Resets the error breaker.
    Success,
    /// The task made progress and wants to be re-entered.
    Running,
    /// The task gave up on this attempt without an error.
    Failure,
}

// ─────────────────────────────────────────────────────────────────────────────
// TaskServices
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborators available to a task routine for the duration of one tick.
pub struct TaskServices<'a> {
    pub client: &'a dyn GameClient,
    pub clock: &'a dyn Clock,
    pub breaker: &'a mut ErrorBreaker,
    pub prices: Option<&'a PriceCache>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of scheduled behaviour.
pub trait Task: Send {
    /// Stable name used in logs and tick outcomes.
    fn name(&self) -> &str;

    /// `true` when the task wants to run given the facts in `ctx`.
    ///
    /// Must not issue actions or mutate anything.
    fn is_eligible(&self, ctx: &ExecutionContext) -> bool;

    /// Perform one tick of work.
    ///
    /// # Errors
    ///
    /// Any [`DelveError`] is reported to the error breaker by the
    /// orchestrator.
    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError>;
}
