//! `delve-runtime` – the task scheduler and everything it drives.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: runs
//!   the first eligible registered task once per tick, catches task errors
//!   and panics at its boundary and feeds them to the
//!   [`ErrorBreaker`][delve_kernel::ErrorBreaker].  A tripped breaker halts
//!   scheduling.
//! - [`task`] – the [`Task`][task::Task] trait, [`TaskStatus`][task::TaskStatus]
//!   and the per-tick [`TaskServices`][task::TaskServices].
//! - [`context`] – [`ExecutionContext`][context::ExecutionContext]: the
//!   immutable facts captured at the start of each tick.
//! - [`device`] – [`DeviceProtocol`][device::DeviceProtocol]: idempotent
//!   open / load / clear / activate operations on the in-world apparatus,
//!   built from bounded polling loops.
//! - [`matcher`] – [`ItemMatcher`][matcher::ItemMatcher] for apparatus items
//!   and [`LootFilter`][matcher::LootFilter] for ground items.
//! - [`tasks`] – the built-in task set and
//!   [`register_default_tasks`][tasks::register_default_tasks].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod context;
pub mod device;
pub mod matcher;
pub mod orchestrator;
pub mod task;
pub mod tasks;
pub mod telemetry;

pub use context::ExecutionContext;
pub use device::{
    ActivationOutcome, DeviceError, DevicePhase, DeviceProtocol, DeviceSession, ItemReadiness,
    OpenOutcome, PlaceOutcome,
};
pub use matcher::{ItemMatcher, LootDecision, LootFilter};
pub use orchestrator::{Orchestrator, TickOutcome};
pub use task::{Task, TaskServices, TaskStatus};
pub use tasks::register_default_tasks;
pub use telemetry::{TracerProviderGuard, init_tracing};
