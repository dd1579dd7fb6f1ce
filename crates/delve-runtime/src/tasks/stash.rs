//! [`StashTask`] – move carried items into remote storage.
//!
//! Items accepted by the apparatus [`ItemMatcher`] are reserved and stay in
//! the inventory; everything else is stashed one item at a time, each move
//! confirmed before the next is issued.

use std::time::Duration;

use delve_hal::GameClient;
use delve_kernel::{Clock, wait_for};
use delve_types::{DelveError, ItemRef, KeyCode, ObjectKind, Settings};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::matcher::ItemMatcher;
use crate::task::{Task, TaskServices, TaskStatus};

use super::step_towards;

/// Inventory items that are not reserved for the apparatus.
pub(crate) fn stashable<'a>(
    ctx: &'a ExecutionContext,
    reserved: &'a ItemMatcher,
) -> impl Iterator<Item = &'a ItemRef> + 'a {
    ctx.inventory.iter().filter(|i| !reserved.matches(i))
}

/// Open the storage interface, approaching it first.  Returns `false` when a
/// move was issued instead.
pub(crate) fn open_storage(
    client: &dyn GameClient,
    clock: &dyn Clock,
    ctx: &ExecutionContext,
    interact_range: f32,
    poll: Duration,
    timeout: Duration,
) -> Result<bool, DelveError> {
    if client.storage().is_some() {
        return Ok(true);
    }
    let storage = ctx
        .find(|k| *k == ObjectKind::Storage)
        .ok_or_else(|| DelveError::NotReady("storage not visible".to_string()))?;
    if step_towards(client, storage.position, interact_range)? {
        return Ok(false);
    }
    client.interact(storage.id)?;
    if wait_for(clock, poll, timeout, || client.storage().is_some()) {
        Ok(true)
    } else {
        Err(DelveError::Timeout {
            operation: "storage to open".to_string(),
            millis: timeout.as_millis(),
        })
    }
}

pub struct StashTask {
    reserved: ItemMatcher,
    interact_range: f32,
    poll_interval: Duration,
    open_timeout: Duration,
    move_timeout: Duration,
}

impl StashTask {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            reserved: ItemMatcher::from_settings(&settings.device),
            interact_range: settings.navigation.interact_range,
            poll_interval: settings.navigation.poll_interval(),
            open_timeout: settings.device.open_timeout(),
            move_timeout: settings.device.place_timeout(),
        }
    }
}

impl Task for StashTask {
    fn name(&self) -> &str {
        "stash"
    }

    fn is_eligible(&self, ctx: &ExecutionContext) -> bool {
        ctx.in_safe_area() && stashable(ctx, &self.reserved).next().is_some()
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        let client = services.client;
        if !open_storage(
            client,
            services.clock,
            ctx,
            self.interact_range,
            self.poll_interval,
            self.open_timeout,
        )? {
            return Ok(TaskStatus::Running);
        }

        let mut stored = 0;
        for item in stashable(ctx, &self.reserved) {
            client.move_item(item.id)?;
            let moved = wait_for(services.clock, self.poll_interval, self.move_timeout, || {
                client.inventory().iter().all(|i| i.id != item.id)
            });
            if !moved {
                return Err(DelveError::Timeout {
                    operation: format!("{} to leave the inventory", item.name),
                    millis: self.move_timeout.as_millis(),
                });
            }
            debug!(item = %item.name, "stashed");
            stored += 1;
        }

        client.press_key(KeyCode::Escape)?;
        info!(stored, "inventory stashed");
        Ok(TaskStatus::Success)
    }
}
