//! In-process game simulation for headless tests and dry runs.
//!
//! [`SimClient`] implements [`StateQuery`] and [`ActionExecutor`] over a
//! small deterministic world: a safe area with the apparatus, a storage
//! container and (after activation) an instance portal; and an instance with
//! a row of objectives that drop loot when defeated.  Latency and failure
//! knobs ([`SimFaults`], activation close delay) let tests drive the control
//! layer into its timeout and recovery paths.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use delve_hal::client::{ActionExecutor, StateQuery};
//! use delve_hal::sim::{SimClient, DEVICE_ID};
//! use delve_kernel::clock::ManualClock;
//! use delve_types::Position;
//!
//! let client = SimClient::builder(Arc::new(ManualClock::new()))
//!     .at(Position::new(6.0, 1.0))
//!     .build();
//!
//! client.interact(DEVICE_ID).expect("sim device must open");
//! assert!(client.device().open);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use delve_kernel::clock::Clock;
use delve_types::{
    ActionError, ActionResult, AreaKind, DeviceState, InstanceCounters, ItemId, ItemRef, KeyCode,
    ObjectId, ObjectKind, Position, WorldObject,
};
use tracing::trace;

use crate::client::{ActionExecutor, StateQuery};

// ────────────────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────────────────

pub const DEVICE_ID: ObjectId = 1;
pub const STORAGE_ID: ObjectId = 2;
pub const INSTANCE_PORTAL_ID: ObjectId = 3;
pub const EXIT_PORTAL_ID: ObjectId = 4;

pub const DEVICE_POSITION: Position = Position::new(6.0, 0.0);
pub const STORAGE_POSITION: Position = Position::new(-6.0, 0.0);
pub const INSTANCE_PORTAL_POSITION: Position = Position::new(0.0, 6.0);
pub const EXIT_PORTAL_POSITION: Position = Position::new(0.0, -3.0);

/// Interactions farther than this fail with [`ActionError::OutOfRange`].
pub const SIM_INTERACT_RANGE: f32 = 3.5;
/// Reach of [`KeyCode::PrimarySkill`].
pub const SIM_SKILL_RANGE: f32 = 5.0;
/// Distance covered by a single `move_towards`.
pub const SIM_STEP: f32 = 2.0;

const OBJECTIVE_SPACING: f32 = 8.0;
const FIRST_GENERATED_ID: u64 = 10_000;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Record of an action issued against the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimAction {
    MoveTowards(Position),
    Interact(ObjectId),
    PressKey(KeyCode),
    MoveItem(ItemId),
}

/// Failure injection switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Interacting with the apparatus succeeds but never opens it.
    pub device_ignores_interact: bool,
    /// `move_item` reports success but nothing moves.
    pub move_item_is_noop: bool,
    /// The apparatus stays open after activation.
    pub device_stays_open: bool,
    /// `move_towards` reports success but the player does not move.
    pub movement_blocked: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// World state
// ────────────────────────────────────────────────────────────────────────────

struct SimWorld {
    area: AreaKind,
    position: Position,
    inventory: Vec<ItemRef>,
    capacity: usize,
    conditions: Vec<String>,
    counters: InstanceCounters,
    device: DeviceState,
    activated_at: Option<Instant>,
    close_delay: Duration,
    instance_ready: bool,
    overlay_open: bool,
    storage_open: bool,
    storage: Vec<ItemRef>,
    objectives: Vec<(ObjectId, Position)>,
    loot: Vec<(ObjectId, ItemRef, Position)>,
    objectives_per_instance: u32,
    loot_table: Vec<String>,
    drops: usize,
    next_id: u64,
    faults: SimFaults,
    log: Vec<SimAction>,
}

impl SimWorld {
    fn new() -> Self {
        Self {
            area: AreaKind::Safe,
            position: Position::default(),
            inventory: Vec::new(),
            capacity: 20,
            conditions: Vec::new(),
            counters: InstanceCounters::default(),
            device: DeviceState {
                open: false,
                loaded: Vec::new(),
                max_slots: 1,
            },
            activated_at: None,
            close_delay: Duration::from_millis(500),
            instance_ready: false,
            overlay_open: false,
            storage_open: false,
            storage: Vec::new(),
            objectives: Vec::new(),
            loot: Vec::new(),
            objectives_per_instance: 3,
            loot_table: vec!["Chaos Orb".to_string()],
            drops: 0,
            next_id: FIRST_GENERATED_ID,
            faults: SimFaults::default(),
            log: Vec::new(),
        }
    }

    /// Apply time-driven transitions.
    fn settle(&mut self, now: Instant) {
        if let Some(at) = self.activated_at
            && !self.faults.device_stays_open
            && now.saturating_duration_since(at) >= self.close_delay
        {
            self.device.open = false;
            self.activated_at = None;
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn object_position(&self, id: ObjectId) -> Option<Position> {
        match (self.area, id) {
            (AreaKind::Safe, DEVICE_ID) => Some(DEVICE_POSITION),
            (AreaKind::Safe, STORAGE_ID) => Some(STORAGE_POSITION),
            (AreaKind::Safe, INSTANCE_PORTAL_ID) if self.instance_ready => {
                Some(INSTANCE_PORTAL_POSITION)
            }
            (AreaKind::Instance, EXIT_PORTAL_ID) => Some(EXIT_PORTAL_POSITION),
            (AreaKind::Instance, _) => self
                .objectives
                .iter()
                .find(|(oid, _)| *oid == id)
                .map(|(_, p)| *p)
                .or_else(|| {
                    self.loot
                        .iter()
                        .find(|(oid, _, _)| *oid == id)
                        .map(|(_, _, p)| *p)
                }),
            _ => None,
        }
    }

    fn enter_instance(&mut self) {
        self.area = AreaKind::Instance;
        self.position = Position::default();
        self.instance_ready = false;
        self.overlay_open = false;
        self.storage_open = false;
        self.device.open = false;
        self.loot.clear();
        let mut objectives = Vec::new();
        for i in 1..=self.objectives_per_instance {
            let id = self.allocate_id();
            objectives.push((id, Position::new(OBJECTIVE_SPACING * i as f32, 0.0)));
        }
        self.objectives = objectives;
        self.counters.objectives_remaining = self.objectives_per_instance;
    }

    fn leave_instance(&mut self) {
        self.area = AreaKind::Safe;
        self.position = Position::default();
        self.objectives.clear();
        self.loot.clear();
        self.counters.objectives_remaining = 0;
    }

    fn use_primary_skill(&mut self) {
        if self.area != AreaKind::Instance {
            return;
        }
        let here = self.position;
        let (defeated, alive): (Vec<_>, Vec<_>) = self
            .objectives
            .drain(..)
            .partition(|(_, p)| p.distance_to(&here) <= SIM_SKILL_RANGE);
        self.objectives = alive;
        for (_, at) in defeated.iter() {
            let name = self.loot_table[self.drops % self.loot_table.len()].clone();
            self.drops += 1;
            let item = ItemRef::new(self.allocate_id(), name, 0);
            let id = self.allocate_id();
            self.loot.push((id, item, *at));
        }
        if !defeated.is_empty() {
            self.counters.objectives_remaining = self.objectives.len() as u32;
            if self.objectives.is_empty() {
                self.counters.completed += 1;
            }
        }
    }

    fn activate(&mut self, now: Instant) -> ActionResult {
        if !self.device.open {
            return Err(ActionError::Rejected("apparatus is not open".to_string()));
        }
        if self.device.loaded.is_empty() {
            return Err(ActionError::Rejected("apparatus is empty".to_string()));
        }
        self.device.loaded.clear();
        self.activated_at = Some(now);
        self.instance_ready = true;
        Ok(())
    }

    fn move_item(&mut self, item: ItemId) -> ActionResult {
        if self.faults.move_item_is_noop {
            return Ok(());
        }
        if self.device.open {
            if let Some(idx) = self.inventory.iter().position(|i| i.id == item) {
                if self.device.loaded.len() >= self.device.max_slots {
                    return Err(ActionError::Rejected("apparatus slots full".to_string()));
                }
                let moved = self.inventory.remove(idx);
                self.device.loaded.push(moved);
                return Ok(());
            }
            if let Some(idx) = self.device.loaded.iter().position(|i| i.id == item) {
                if self.inventory.len() >= self.capacity {
                    return Err(ActionError::InventoryFull);
                }
                let moved = self.device.loaded.remove(idx);
                self.inventory.push(moved);
                return Ok(());
            }
            return Err(ActionError::TargetNotFound(item));
        }
        if self.storage_open {
            if let Some(idx) = self.inventory.iter().position(|i| i.id == item) {
                let moved = self.inventory.remove(idx);
                self.storage.push(moved);
                return Ok(());
            }
            if let Some(idx) = self.storage.iter().position(|i| i.id == item) {
                if self.inventory.len() >= self.capacity {
                    return Err(ActionError::InventoryFull);
                }
                let moved = self.storage.remove(idx);
                self.inventory.push(moved);
                return Ok(());
            }
            return Err(ActionError::TargetNotFound(item));
        }
        Err(ActionError::Rejected("no container open".to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimClient
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic in-process game client.
///
/// Every call locks the world, applies pending time-driven transitions using
/// the injected [`Clock`], and records actions in a log readable through
/// [`SimClient::actions`].
pub struct SimClient {
    clock: Arc<dyn Clock>,
    world: Mutex<SimWorld>,
}

impl SimClient {
    /// Start building a simulator that reads time from `clock`.
    pub fn builder(clock: Arc<dyn Clock>) -> SimClientBuilder {
        SimClientBuilder {
            clock,
            world: SimWorld::new(),
        }
    }

    fn world(&self) -> MutexGuard<'_, SimWorld> {
        let mut world = self.world.lock().unwrap_or_else(|e| e.into_inner());
        world.settle(self.clock.now());
        world
    }

    fn record(&self, world: &mut SimWorld, action: SimAction) {
        trace!(?action, "sim action");
        world.log.push(action);
    }

    // -------------------------------------------------------------------------
    // Inspection and scripting (tests / dry runs)
    // -------------------------------------------------------------------------

    /// Every action issued so far, oldest first.
    pub fn actions(&self) -> Vec<SimAction> {
        self.world().log.clone()
    }

    pub fn action_count(&self) -> usize {
        self.world().log.len()
    }

    pub fn clear_actions(&self) {
        self.world().log.clear();
    }

    pub fn set_position(&self, position: Position) {
        self.world().position = position;
    }

    pub fn set_conditions(&self, conditions: Vec<String>) {
        self.world().conditions = conditions;
    }

    pub fn set_overlay_open(&self, open: bool) {
        self.world().overlay_open = open;
    }

    pub fn set_device_open(&self, open: bool) {
        self.world().device.open = open;
    }

    pub fn set_faults(&self, faults: SimFaults) {
        self.world().faults = faults;
    }

    /// Put items straight into the apparatus, bypassing actions.
    pub fn preload_device(&self, items: Vec<ItemRef>) {
        self.world().device.loaded.extend(items);
    }

    /// Drop an item on the ground of the current instance.
    pub fn spawn_loot(&self, item: ItemRef, at: Position) -> ObjectId {
        let mut world = self.world();
        let id = world.allocate_id();
        world.loot.push((id, item, at));
        id
    }

    /// Contents of the storage regardless of whether it is open.
    pub fn storage_contents(&self) -> Vec<ItemRef> {
        self.world().storage.clone()
    }
}

impl StateQuery for SimClient {
    fn position(&self) -> Position {
        self.world().position
    }

    fn area(&self) -> AreaKind {
        self.world().area
    }

    fn inventory(&self) -> Vec<ItemRef> {
        self.world().inventory.clone()
    }

    fn inventory_capacity(&self) -> usize {
        self.world().capacity
    }

    fn status_conditions(&self) -> Vec<String> {
        self.world().conditions.clone()
    }

    fn counters(&self) -> InstanceCounters {
        self.world().counters
    }

    fn device(&self) -> DeviceState {
        self.world().device.clone()
    }

    fn overlay_open(&self) -> bool {
        self.world().overlay_open
    }

    fn storage(&self) -> Option<Vec<ItemRef>> {
        let world = self.world();
        world.storage_open.then(|| world.storage.clone())
    }

    fn nearby_objects(&self) -> Vec<WorldObject> {
        let world = self.world();
        let mut objects = Vec::new();
        match world.area {
            AreaKind::Safe => {
                objects.push(WorldObject {
                    id: DEVICE_ID,
                    kind: ObjectKind::Device,
                    position: DEVICE_POSITION,
                });
                objects.push(WorldObject {
                    id: STORAGE_ID,
                    kind: ObjectKind::Storage,
                    position: STORAGE_POSITION,
                });
                if world.instance_ready {
                    objects.push(WorldObject {
                        id: INSTANCE_PORTAL_ID,
                        kind: ObjectKind::InstancePortal,
                        position: INSTANCE_PORTAL_POSITION,
                    });
                }
            }
            AreaKind::Instance => {
                objects.push(WorldObject {
                    id: EXIT_PORTAL_ID,
                    kind: ObjectKind::ExitPortal,
                    position: EXIT_PORTAL_POSITION,
                });
                objects.extend(world.objectives.iter().map(|(id, p)| WorldObject {
                    id: *id,
                    kind: ObjectKind::Objective,
                    position: *p,
                }));
                objects.extend(world.loot.iter().map(|(id, item, p)| WorldObject {
                    id: *id,
                    kind: ObjectKind::Loot { item: item.clone() },
                    position: *p,
                }));
            }
            AreaKind::Loading => {}
        }
        objects
    }
}

impl ActionExecutor for SimClient {
    fn move_towards(&self, target: Position) -> ActionResult {
        let mut world = self.world();
        self.record(&mut world, SimAction::MoveTowards(target));
        if world.area == AreaKind::Loading {
            return Err(ActionError::Busy);
        }
        if world.faults.movement_blocked {
            return Ok(());
        }
        let here = world.position;
        let distance = here.distance_to(&target);
        world.position = if distance <= SIM_STEP {
            target
        } else {
            let scale = SIM_STEP / distance;
            Position::new(
                here.x + (target.x - here.x) * scale,
                here.y + (target.y - here.y) * scale,
            )
        };
        Ok(())
    }

    fn interact(&self, object: ObjectId) -> ActionResult {
        let mut world = self.world();
        self.record(&mut world, SimAction::Interact(object));
        let at = world
            .object_position(object)
            .ok_or(ActionError::TargetNotFound(object))?;
        let distance = world.position.distance_to(&at);
        if distance > SIM_INTERACT_RANGE {
            return Err(ActionError::OutOfRange {
                distance,
                max: SIM_INTERACT_RANGE,
            });
        }
        match object {
            DEVICE_ID if world.area == AreaKind::Safe => {
                if !world.faults.device_ignores_interact {
                    world.device.open = true;
                }
                Ok(())
            }
            STORAGE_ID if world.area == AreaKind::Safe => {
                world.storage_open = true;
                world.overlay_open = true;
                Ok(())
            }
            INSTANCE_PORTAL_ID if world.area == AreaKind::Safe => {
                world.enter_instance();
                Ok(())
            }
            EXIT_PORTAL_ID if world.area == AreaKind::Instance => {
                world.leave_instance();
                Ok(())
            }
            id => {
                let Some(idx) = world.loot.iter().position(|(oid, _, _)| *oid == id) else {
                    return Err(ActionError::Rejected("cannot interact with objective".to_string()));
                };
                if world.inventory.len() >= world.capacity {
                    return Err(ActionError::InventoryFull);
                }
                let (_, item, _) = world.loot.remove(idx);
                world.inventory.push(item);
                Ok(())
            }
        }
    }

    fn press_key(&self, key: KeyCode) -> ActionResult {
        let now = self.clock.now();
        let mut world = self.world();
        self.record(&mut world, SimAction::PressKey(key));
        match key {
            KeyCode::Escape => {
                world.overlay_open = false;
                world.storage_open = false;
                world.device.open = false;
                Ok(())
            }
            KeyCode::Activate => world.activate(now),
            KeyCode::PrimarySkill => {
                world.use_primary_skill();
                Ok(())
            }
            KeyCode::Dodge => {
                world.faults.movement_blocked = false;
                world.position.y += SIM_STEP;
                Ok(())
            }
        }
    }

    fn move_item(&self, item: ItemId) -> ActionResult {
        let mut world = self.world();
        self.record(&mut world, SimAction::MoveItem(item));
        world.move_item(item)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimClientBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimClient`].
pub struct SimClientBuilder {
    clock: Arc<dyn Clock>,
    world: SimWorld,
}

impl SimClientBuilder {
    /// Starting position.
    pub fn at(mut self, position: Position) -> Self {
        self.world.position = position;
        self
    }

    pub fn with_inventory(mut self, items: Vec<ItemRef>) -> Self {
        self.world.inventory = items;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.world.capacity = capacity;
        self
    }

    pub fn with_storage(mut self, items: Vec<ItemRef>) -> Self {
        self.world.storage = items;
        self
    }

    pub fn with_device_slots(mut self, slots: usize) -> Self {
        self.world.device.max_slots = slots;
        self
    }

    /// Objectives spawned in every instance.
    pub fn with_objectives(mut self, count: u32) -> Self {
        self.world.objectives_per_instance = count;
        self
    }

    /// Names dropped by defeated objectives, used round-robin.  An empty
    /// list is ignored.
    pub fn with_loot_table(mut self, names: Vec<String>) -> Self {
        if !names.is_empty() {
            self.world.loot_table = names;
        }
        self
    }

    /// Delay between activation and the apparatus reporting closed.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.world.close_delay = delay;
        self
    }

    pub fn with_faults(mut self, faults: SimFaults) -> Self {
        self.world.faults = faults;
        self
    }

    /// Start inside a freshly entered instance instead of the safe area.
    pub fn in_instance(mut self) -> Self {
        self.world.enter_instance();
        self
    }

    pub fn build(self) -> SimClient {
        SimClient {
            clock: self.clock,
            world: Mutex::new(self.world),
        }
    }
}
