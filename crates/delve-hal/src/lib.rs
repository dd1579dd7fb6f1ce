//! `delve-hal` – game client abstraction layer.
//!
//! # Modules
//!
//! - [`client`] – the collaborator traits: [`StateQuery`][client::StateQuery]
//!   for fresh read-only state, [`ActionExecutor`][client::ActionExecutor]
//!   for simulated input, and the blanket [`GameClient`][client::GameClient].
//! - [`sim`] – [`SimClient`][sim::SimClient]: a deterministic in-process
//!   world with latency and fault injection, used for headless tests and the
//!   CLI dry run.

pub mod client;
pub mod sim;

pub use client::{ActionExecutor, GameClient, StateQuery};
pub use sim::{SimAction, SimClient, SimFaults};
