//! `delve-types` – shared vocabulary for the delve automation stack.
//!
//! Every crate in the workspace speaks in these types: positions and world
//! objects reported by the game client, the action error codes returned by
//! the client, and the top-level [`DelveError`].
//!
//! The flat automation [`Settings`][settings::Settings] structure lives in
//! [`settings`].

pub mod settings;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use settings::Settings;

/// Identifier of an object in the world (apparatus, portal, loot, ...).
pub type ObjectId = u64;

/// Identifier of an item instance (inventory, storage or device slot).
pub type ItemId = u64;

/// A point on the 2-D world plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A reference to a single item instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub name: String,
    /// Item tier used by tier filters; `0` when the item has no tier.
    pub tier: u8,
}

impl ItemRef {
    pub fn new(id: ItemId, name: impl Into<String>, tier: u8) -> Self {
        Self {
            id,
            name: name.into(),
            tier,
        }
    }
}

/// Broad classification of an enumerated world object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// The apparatus used to load items and open an instance.
    Device,
    /// Portal into the instance created by the device.
    InstancePortal,
    /// Portal out of the instance back to the safe area.
    ExitPortal,
    /// Remote storage (stash) container.
    Storage,
    /// An item lying on the ground.
    Loot { item: ItemRef },
    /// Something that must be defeated to complete the instance.
    Objective,
}

/// An object enumerated near the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Position,
}

/// Which kind of area the player currently stands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaKind {
    Safe,
    Instance,
    /// Area transition in progress.
    Loading,
}

/// Externally reported apparatus state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    pub open: bool,
    pub loaded: Vec<ItemRef>,
    pub max_slots: usize,
}

/// Instance progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceCounters {
    /// Instances fully completed since the client started.
    pub completed: u32,
    /// Objectives still alive in the current instance.
    pub objectives_remaining: u32,
}

/// Simulated key presses understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// Closes the topmost overlay interface.
    Escape,
    /// Activates the open apparatus.
    Activate,
    /// Uses the primary combat skill.
    PrimarySkill,
    /// Evasive movement skill, used to break free when stuck.
    Dodge,
}

/// Failure categories returned by the action executor.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionError {
    #[error("target {0} not found")]
    TargetNotFound(u64),

    #[error("target out of range ({distance:.1} > {max:.1})")]
    OutOfRange { distance: f32, max: f32 },

    #[error("client busy")]
    Busy,

    #[error("inventory full")]
    InventoryFull,

    #[error("action rejected: {0}")]
    Rejected(String),
}

/// Result code of a single client action.
pub type ActionResult = Result<(), ActionError>;

/// Top-level error type spanning task routines and service boundaries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DelveError {
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Timed out after {millis} ms waiting for {operation}")]
    Timeout { operation: String, millis: u128 },

    #[error("Action failed: {0}")]
    Action(#[from] ActionError),

    #[error("Systemic failure: {0}")]
    Systemic(String),

    #[error("Reference data unavailable for {category}: {reason}")]
    ExternalDataUnavailable { category: String, reason: String },

    #[error("Task fault in {task}: {details}")]
    TaskFault { task: String, details: String },
}
