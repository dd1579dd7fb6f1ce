//! Collaborator interfaces for the external game client.
//!
//! Drivers implement [`StateQuery`] and [`ActionExecutor`]; the rest of the
//! stack only ever talks to these traits, so the in-process simulator and a
//! real client binding are interchangeable.
//!
//! All queries are read-only and return fresh values on every call.  Actions
//! return an [`ActionResult`] whose error variants name the failure category;
//! callers branch on them rather than trusting a bare success flag.

use delve_types::{
    ActionResult, AreaKind, DeviceState, InstanceCounters, ItemId, ItemRef, KeyCode, ObjectId,
    Position, WorldObject,
};

/// Read-only view of the externally observed game state.
pub trait StateQuery: Send + Sync {
    /// Current player position.
    fn position(&self) -> Position;

    /// Kind of area the player is in.
    fn area(&self) -> AreaKind;

    /// Items currently carried.
    fn inventory(&self) -> Vec<ItemRef>;

    /// Number of items the inventory can hold.
    fn inventory_capacity(&self) -> usize;

    /// Names of the status conditions currently affecting the player.
    fn status_conditions(&self) -> Vec<String>;

    /// Instance completion counters.
    fn counters(&self) -> InstanceCounters;

    /// Apparatus open state and loaded items.
    fn device(&self) -> DeviceState;

    /// `true` while an overlay interface blocks interaction with the world.
    fn overlay_open(&self) -> bool;

    /// Remote storage contents, `None` unless the storage interface is open.
    fn storage(&self) -> Option<Vec<ItemRef>>;

    /// Objects enumerated near the player.
    fn nearby_objects(&self) -> Vec<WorldObject>;

    /// `true` when the inventory cannot take another item.
    fn inventory_full(&self) -> bool {
        self.inventory().len() >= self.inventory_capacity()
    }
}

/// Simulated input actions.
pub trait ActionExecutor: Send + Sync {
    /// Walk one step towards `target`.
    fn move_towards(&self, target: Position) -> ActionResult;

    /// Interact with (click on) a world object.
    fn interact(&self, object: ObjectId) -> ActionResult;

    /// Simulate a key press.
    fn press_key(&self, key: KeyCode) -> ActionResult;

    /// Move an item between the inventory and whichever container is open.
    fn move_item(&self, item: ItemId) -> ActionResult;
}

/// A full client: everything the control layer needs.
pub trait GameClient: StateQuery + ActionExecutor {}

impl<T: StateQuery + ActionExecutor> GameClient for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::ActionError;

    /// Minimal client used only to exercise the default method.
    struct FixedInventory {
        items: usize,
        capacity: usize,
    }

    impl StateQuery for FixedInventory {
        fn position(&self) -> Position {
            Position::default()
        }
        fn area(&self) -> AreaKind {
            AreaKind::Safe
        }
        fn inventory(&self) -> Vec<ItemRef> {
            (0..self.items as u64)
                .map(|id| ItemRef::new(id, "Scrap", 0))
                .collect()
        }
        fn inventory_capacity(&self) -> usize {
            self.capacity
        }
        fn status_conditions(&self) -> Vec<String> {
            Vec::new()
        }
        fn counters(&self) -> InstanceCounters {
            InstanceCounters::default()
        }
        fn device(&self) -> DeviceState {
            DeviceState::default()
        }
        fn overlay_open(&self) -> bool {
            false
        }
        fn storage(&self) -> Option<Vec<ItemRef>> {
            None
        }
        fn nearby_objects(&self) -> Vec<WorldObject> {
            Vec::new()
        }
    }

    impl ActionExecutor for FixedInventory {
        fn move_towards(&self, _target: Position) -> ActionResult {
            Ok(())
        }
        fn interact(&self, object: ObjectId) -> ActionResult {
            Err(ActionError::TargetNotFound(object))
        }
        fn press_key(&self, _key: KeyCode) -> ActionResult {
            Ok(())
        }
        fn move_item(&self, item: ItemId) -> ActionResult {
            Err(ActionError::TargetNotFound(item))
        }
    }

    fn as_client(c: &dyn GameClient) -> &dyn GameClient {
        c
    }

    #[test]
    fn inventory_full_compares_against_capacity() {
        assert!(!FixedInventory { items: 2, capacity: 3 }.inventory_full());
        assert!(FixedInventory { items: 3, capacity: 3 }.inventory_full());
    }

    #[test]
    fn any_query_plus_executor_is_a_game_client() {
        let client = FixedInventory { items: 0, capacity: 1 };
        let dyn_client = as_client(&client);
        assert_eq!(dyn_client.interact(9), Err(ActionError::TargetNotFound(9)));
    }
}
