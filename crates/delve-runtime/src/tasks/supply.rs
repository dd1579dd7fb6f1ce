//! Storage supply sub-routine used by [`EnterTask`][super::EnterTask] when
//! neither the apparatus nor the inventory holds a usable item.

use std::time::Duration;

use delve_hal::GameClient;
use delve_kernel::{Clock, wait_for};
use delve_types::{DelveError, ItemRef, KeyCode, Settings};
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::matcher::ItemMatcher;

use super::stash::open_storage;

/// Result of one [`SupplyRoutine::fetch`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplyOutcome {
    /// Still walking to the storage.
    Approaching,
    /// The item is now in the inventory.
    Retrieved(ItemRef),
    /// The storage holds no matching item.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SupplyRoutine {
    interact_range: f32,
    poll_interval: Duration,
    open_timeout: Duration,
    move_timeout: Duration,
}

impl SupplyRoutine {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interact_range: settings.navigation.interact_range,
            poll_interval: settings.navigation.poll_interval(),
            open_timeout: settings.device.open_timeout(),
            move_timeout: settings.device.place_timeout(),
        }
    }

    /// Take one item accepted by `matcher` out of storage.
    ///
    /// The apparatus is closed first since an open apparatus captures item
    /// moves.
    pub fn fetch(
        &self,
        client: &dyn GameClient,
        clock: &dyn Clock,
        ctx: &ExecutionContext,
        matcher: &ItemMatcher,
    ) -> Result<SupplyOutcome, DelveError> {
        if client.device().open {
            client.press_key(KeyCode::Escape)?;
            if !wait_for(clock, self.poll_interval, self.open_timeout, || !client.device().open) {
                return Err(DelveError::Timeout {
                    operation: "apparatus to close".to_string(),
                    millis: self.open_timeout.as_millis(),
                });
            }
        }

        if !open_storage(
            client,
            clock,
            ctx,
            self.interact_range,
            self.poll_interval,
            self.open_timeout,
        )? {
            return Ok(SupplyOutcome::Approaching);
        }

        let stored = client.storage().unwrap_or_default();
        let Some(item) = matcher.best(&stored).cloned() else {
            warn!("storage holds no usable apparatus item");
            client.press_key(KeyCode::Escape)?;
            return Ok(SupplyOutcome::Exhausted);
        };

        client.move_item(item.id)?;
        let arrived = wait_for(clock, self.poll_interval, self.move_timeout, || {
            client.inventory().iter().any(|i| i.id == item.id)
        });
        client.press_key(KeyCode::Escape)?;
        if !arrived {
            return Err(DelveError::Timeout {
                operation: format!("{} to arrive from storage", item.name),
                millis: self.move_timeout.as_millis(),
            });
        }
        info!(item = %item.name, "supplied from storage");
        Ok(SupplyOutcome::Retrieved(item))
    }
}
