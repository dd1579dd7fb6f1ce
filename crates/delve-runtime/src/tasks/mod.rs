//! The built-in task set, in priority order.
//!
//! | Priority | Task | Runs when |
//! |---|---|---|
//! | 1 | [`LootTask`] | in an instance, inventory not full, worthwhile loot nearby |
//! | 2 | [`ReturnTask`] | in an instance that is complete or with a full inventory |
//! | 3 | [`ClearTask`] | in an instance with objectives remaining |
//! | 4 | [`StashTask`] | in the safe area carrying items that are not apparatus items |
//! | 5 | [`EnterTask`] | in the safe area, nothing to stash, run limit not reached |
//!
//! [`register_default_tasks`] wires all five into an orchestrator.

pub mod clear;
pub mod enter;
pub mod loot;
pub mod return_home;
pub mod stash;
pub mod supply;

use delve_hal::GameClient;
use delve_types::{DelveError, Position, Settings};

use crate::orchestrator::Orchestrator;

pub use clear::ClearTask;
pub use enter::{EnterStage, EnterTask};
pub use loot::LootTask;
pub use return_home::ReturnTask;
pub use stash::StashTask;

/// Register the built-in tasks on `orchestrator` in priority order.
pub fn register_default_tasks(orchestrator: &mut Orchestrator, settings: &Settings) {
    orchestrator.register(LootTask::from_settings(settings));
    orchestrator.register(ReturnTask::from_settings(settings));
    orchestrator.register(ClearTask::from_settings(settings));
    orchestrator.register(StashTask::from_settings(settings));
    orchestrator.register(EnterTask::from_settings(settings));
}

/// Issue one move towards `target` when the player is farther than `range`.
///
/// Returns `true` when a move was issued, `false` when already in range.
pub(crate) fn step_towards(
    client: &dyn GameClient,
    target: Position,
    range: f32,
) -> Result<bool, DelveError> {
    if client.position().distance_to(&target) <= range {
        return Ok(false);
    }
    client.move_towards(target)?;
    Ok(true)
}
