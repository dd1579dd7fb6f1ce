//! [`DeviceProtocol`] – idempotent apparatus interaction.
//!
//! Loads items into the in-world apparatus and activates it using only
//! bounded polling against freshly queried client state.  Every operation
//! checks the observed state first and does nothing when the desired state
//! already holds, so callers can safely re-invoke it on every tick.
//!
//! # Phases
//!
//! ```text
//! Closed ──open_device──▶ Opening ──▶ Open ──place_item──▶ Loading ──▶ Open
//!                                      │
//!                                      └──activate_device──▶ Activating ──▶ Closed
//!                                                                     └──▶ Failed
//! ```
//!
//! A [`DeviceSession`] is created when the protocol first observes the
//! apparatus open and discarded on a terminal state (activated or failed).

use std::time::Duration;

use delve_hal::GameClient;
use delve_kernel::{Clock, wait_for};
use delve_types::settings::DeviceSettings;
use delve_types::{ActionError, DelveError, DeviceState, ItemRef, KeyCode, ObjectKind};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::matcher::ItemMatcher;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Where the protocol believes the apparatus is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePhase {
    Closed,
    Opening,
    Open,
    Loading,
    Activating,
    Failed,
}

/// Transient apparatus state tracked between operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub open: bool,
    pub loaded: Vec<ItemRef>,
    pub max_slots: usize,
}

impl From<DeviceState> for DeviceSession {
    fn from(state: DeviceState) -> Self {
        Self {
            open: state.open,
            loaded: state.loaded,
            max_slots: state.max_slots,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// Too far away; a move towards the apparatus was issued.
    Approaching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    /// The item was already loaded; nothing was done.
    AlreadyLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Closed,
    /// Activation was issued but the apparatus did not report closed in
    /// time.  Treated as a soft warning.
    RemainedOpen,
}

/// Result of [`DeviceProtocol::ensure_item_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemReadiness {
    Ready,
    NeedExternalSupply,
    DeviceNotOpen,
    InsertionFailed,
    Error(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("apparatus not ready: {0}")]
    NotReady(String),
    #[error("apparatus not found nearby")]
    NotFound,
    #[error("timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("action failed: {0}")]
    Action(#[from] ActionError),
    #[error("all {max} apparatus slots are used")]
    SlotsFull { max: usize },
    #[error("apparatus closed before activation completed")]
    ClosedBeforeActivation,
}

impl From<DeviceError> for DelveError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::NotReady(msg) => DelveError::NotReady(msg),
            DeviceError::Timeout { operation, after } => DelveError::Timeout {
                operation: operation.to_string(),
                millis: after.as_millis(),
            },
            DeviceError::Action(a) => DelveError::Action(a),
            other => DelveError::NotReady(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DeviceProtocol
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the apparatus through open → load → activate.
#[derive(Debug)]
pub struct DeviceProtocol {
    settings: DeviceSettings,
    phase: DevicePhase,
    session: Option<DeviceSession>,
}

impl DeviceProtocol {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings,
            phase: DevicePhase::Closed,
            session: None,
        }
    }

    pub fn phase(&self) -> DevicePhase {
        self.phase
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    /// Discard the session after a failure outside the protocol.
    pub fn abandon(&mut self) {
        if self.session.is_some() {
            debug!(phase = ?self.phase, "apparatus session abandoned");
        }
        self.session = None;
        self.phase = DevicePhase::Closed;
    }

    fn observe(&mut self, state: DeviceState) {
        self.session = Some(state.into());
    }

    fn fail(&mut self) {
        self.session = None;
        self.phase = DevicePhase::Failed;
    }

    /// Open the apparatus, approaching it first when out of range.
    ///
    /// Already open ⇒ [`OpenOutcome::Opened`] without issuing any action.
    #[instrument(skip_all)]
    pub fn open_device(
        &mut self,
        client: &dyn GameClient,
        clock: &dyn Clock,
    ) -> Result<OpenOutcome, DeviceError> {
        let state = client.device();
        if state.open {
            self.observe(state);
            if !matches!(self.phase, DevicePhase::Loading | DevicePhase::Activating) {
                self.phase = DevicePhase::Open;
            }
            return Ok(OpenOutcome::Opened);
        }

        let poll = self.settings.poll_interval();
        if client.overlay_open() {
            debug!("closing blocking overlay");
            client.press_key(KeyCode::Escape)?;
            if !wait_for(clock, poll, self.settings.overlay_timeout(), || !client.overlay_open()) {
                return Err(DeviceError::Timeout {
                    operation: "overlay to close",
                    after: self.settings.overlay_timeout(),
                });
            }
        }

        let device = client
            .nearby_objects()
            .into_iter()
            .find(|o| o.kind == ObjectKind::Device)
            .ok_or(DeviceError::NotFound)?;
        let distance = client.position().distance_to(&device.position);
        self.phase = DevicePhase::Opening;
        if distance > self.settings.proximity {
            debug!(distance, "approaching apparatus");
            client.move_towards(device.position)?;
            return Ok(OpenOutcome::Approaching);
        }

        client.interact(device.id)?;
        if wait_for(clock, poll, self.settings.open_timeout(), || client.device().open) {
            self.observe(client.device());
            self.phase = DevicePhase::Open;
            info!("apparatus open");
            Ok(OpenOutcome::Opened)
        } else {
            self.fail();
            Err(DeviceError::Timeout {
                operation: "apparatus to open",
                after: self.settings.open_timeout(),
            })
        }
    }

    /// Move `item` from the inventory into the open apparatus.
    ///
    /// Success requires the observed loaded count to grow by exactly one.
    #[instrument(skip_all, fields(item = %item.name, id = item.id))]
    pub fn place_item(
        &mut self,
        client: &dyn GameClient,
        clock: &dyn Clock,
        item: &ItemRef,
    ) -> Result<PlaceOutcome, DeviceError> {
        let state = client.device();
        if !state.open {
            return Err(DeviceError::NotReady("apparatus is not open".to_string()));
        }
        if state.loaded.iter().any(|i| i.id == item.id) {
            self.observe(state);
            return Ok(PlaceOutcome::AlreadyLoaded);
        }
        if state.loaded.len() >= state.max_slots {
            return Err(DeviceError::SlotsFull {
                max: state.max_slots,
            });
        }

        let prior = state.loaded.len();
        self.phase = DevicePhase::Loading;
        let placed = client.move_item(item.id).map_err(DeviceError::from).and_then(|()| {
            if wait_for(clock, self.settings.poll_interval(), self.settings.place_timeout(), || {
                client.device().loaded.len() == prior + 1
            }) {
                Ok(PlaceOutcome::Placed)
            } else {
                Err(DeviceError::Timeout {
                    operation: "item to appear in the apparatus",
                    after: self.settings.place_timeout(),
                })
            }
        });
        self.phase = DevicePhase::Open;
        self.observe(client.device());
        if placed.is_ok() {
            debug!(loaded = prior + 1, "item placed");
        }
        placed
    }

    /// Move every loaded item back out.  Per-item failures are logged and
    /// skipped; returns the number of successful moves.
    #[instrument(skip_all)]
    pub fn clear_device(
        &mut self,
        client: &dyn GameClient,
        clock: &dyn Clock,
    ) -> Result<usize, DeviceError> {
        let state = client.device();
        if !state.open {
            return Err(DeviceError::NotReady("apparatus is not open".to_string()));
        }
        let mut moved = 0;
        for (i, item) in state.loaded.iter().enumerate() {
            if i > 0 {
                clock.sleep(self.settings.clear_delay());
            }
            match client.move_item(item.id) {
                Ok(()) => moved += 1,
                Err(e) => warn!(item = %item.name, error = %e, "could not remove item from apparatus"),
            }
        }
        self.observe(client.device());
        Ok(moved)
    }

    /// Activate the open apparatus and wait for it to close.
    #[instrument(skip_all)]
    pub fn activate_device(
        &mut self,
        client: &dyn GameClient,
        clock: &dyn Clock,
    ) -> Result<ActivationOutcome, DeviceError> {
        if !client.device().open {
            return Err(DeviceError::NotReady("apparatus is not open".to_string()));
        }
        self.phase = DevicePhase::Activating;
        if let Err(e) = client.press_key(KeyCode::Activate) {
            self.phase = DevicePhase::Open;
            return Err(e.into());
        }

        clock.sleep(self.settings.settle());
        if !client.device().open {
            self.fail();
            return Err(DeviceError::ClosedBeforeActivation);
        }

        let closed = wait_for(
            clock,
            self.settings.poll_interval(),
            self.settings.activate_timeout(),
            || !client.device().open,
        );
        self.session = None;
        self.phase = DevicePhase::Closed;
        if closed {
            info!("apparatus activated");
            Ok(ActivationOutcome::Closed)
        } else {
            warn!(
                timeout = ?self.settings.activate_timeout(),
                "apparatus still open after activation"
            );
            Ok(ActivationOutcome::RemainedOpen)
        }
    }

    /// Make sure the apparatus holds an item accepted by `matcher`, loading
    /// the best-ranked inventory item when needed.
    pub fn ensure_item_ready(
        &mut self,
        client: &dyn GameClient,
        clock: &dyn Clock,
        matcher: &ItemMatcher,
    ) -> ItemReadiness {
        let state = client.device();
        if !state.open {
            return ItemReadiness::DeviceNotOpen;
        }
        if state.loaded.iter().any(|i| matcher.matches(i)) {
            self.observe(state);
            return ItemReadiness::Ready;
        }
        let inventory = client.inventory();
        let Some(candidate) = matcher.best(&inventory).cloned() else {
            return ItemReadiness::NeedExternalSupply;
        };
        match self.place_item(client, clock, &candidate) {
            Ok(_) => ItemReadiness::Ready,
            Err(DeviceError::Timeout { .. }) => ItemReadiness::InsertionFailed,
            Err(e) => ItemReadiness::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use delve_hal::StateQuery;
    use delve_hal::sim::{DEVICE_POSITION, SimAction, SimClient, SimFaults};
    use delve_kernel::ManualClock;
    use delve_types::Position;

    fn map(id: u64) -> ItemRef {
        ItemRef::new(id, "Tier 5 Map", 5)
    }

    fn near_device() -> Position {
        Position::new(DEVICE_POSITION.x - 2.0, DEVICE_POSITION.y)
    }

    fn setup(inventory: Vec<ItemRef>) -> (Arc<ManualClock>, SimClient, DeviceProtocol) {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone())
            .at(near_device())
            .with_inventory(inventory)
            .build();
        (clock, client, DeviceProtocol::new(DeviceSettings::default()))
    }

    #[test]
    fn open_on_already_open_device_issues_no_action() {
        let (clock, client, mut device) = setup(vec![]);
        client.set_device_open(true);

        assert_eq!(device.open_device(&client, clock.as_ref()), Ok(OpenOutcome::Opened));
        assert_eq!(client.action_count(), 0);
        assert_eq!(device.phase(), DevicePhase::Open);
        assert!(device.session().is_some());
    }

    #[test]
    fn open_approaches_when_far_away() {
        let (clock, client, mut device) = setup(vec![]);
        client.set_position(Position::default());

        assert_eq!(
            device.open_device(&client, clock.as_ref()),
            Ok(OpenOutcome::Approaching)
        );
        assert_eq!(client.actions(), vec![SimAction::MoveTowards(DEVICE_POSITION)]);
        assert_eq!(device.phase(), DevicePhase::Opening);
    }

    #[test]
    fn open_closes_overlay_then_interacts() {
        let (clock, client, mut device) = setup(vec![]);
        client.set_overlay_open(true);

        assert_eq!(device.open_device(&client, clock.as_ref()), Ok(OpenOutcome::Opened));
        let actions = client.actions();
        assert_eq!(actions[0], SimAction::PressKey(KeyCode::Escape));
        assert!(matches!(actions[1], SimAction::Interact(_)));
    }

    #[test]
    fn open_times_out_when_device_ignores_interact() {
        let (clock, client, mut device) = setup(vec![]);
        client.set_faults(SimFaults {
            device_ignores_interact: true,
            ..SimFaults::default()
        });
        let start = clock.elapsed();

        let result = device.open_device(&client, clock.as_ref());
        assert!(matches!(result, Err(DeviceError::Timeout { .. })));
        assert_eq!(device.phase(), DevicePhase::Failed);
        assert!(device.session().is_none());
        let waited = clock.elapsed() - start;
        assert!(waited >= DeviceSettings::default().open_timeout());
    }

    #[test]
    fn place_requires_open_device() {
        let (clock, client, mut device) = setup(vec![map(1)]);
        let result = device.place_item(&client, clock.as_ref(), &map(1));
        assert!(matches!(result, Err(DeviceError::NotReady(_))));
        assert_eq!(client.action_count(), 0);
    }

    #[test]
    fn place_twice_is_idempotent() {
        let (clock, client, mut device) = setup(vec![map(1)]);
        client.set_device_open(true);

        assert_eq!(
            device.place_item(&client, clock.as_ref(), &map(1)),
            Ok(PlaceOutcome::Placed)
        );
        let after_first = client.action_count();
        assert_eq!(
            device.place_item(&client, clock.as_ref(), &map(1)),
            Ok(PlaceOutcome::AlreadyLoaded)
        );
        assert_eq!(client.action_count(), after_first);
        assert_eq!(device.session().unwrap().loaded, vec![map(1)]);
    }

    #[test]
    fn place_only_counts_confirmed_increase() {
        let (clock, client, mut device) = setup(vec![map(1)]);
        client.set_device_open(true);
        client.set_faults(SimFaults {
            move_item_is_noop: true,
            ..SimFaults::default()
        });

        let result = device.place_item(&client, clock.as_ref(), &map(1));
        assert!(matches!(result, Err(DeviceError::Timeout { .. })));
        assert_eq!(device.phase(), DevicePhase::Open);
    }

    #[test]
    fn place_into_full_device_is_rejected() {
        let (clock, client, mut device) = setup(vec![map(2)]);
        client.set_device_open(true);
        client.preload_device(vec![map(1)]);

        assert_eq!(
            device.place_item(&client, clock.as_ref(), &map(2)),
            Err(DeviceError::SlotsFull { max: 1 })
        );
    }

    #[test]
    fn clear_moves_every_item_out() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone())
            .at(near_device())
            .with_device_slots(3)
            .build();
        client.set_device_open(true);
        client.preload_device(vec![map(1), map(2), map(3)]);
        let mut device = DeviceProtocol::new(DeviceSettings::default());

        assert_eq!(device.clear_device(&client, clock.as_ref()), Ok(3));
        assert!(client.device().loaded.is_empty());
        assert_eq!(client.inventory().len(), 3);
        // Two pauses between three items.
        assert_eq!(clock.elapsed(), DeviceSettings::default().clear_delay() * 2);
    }

    #[test]
    fn clear_skips_failing_items() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone())
            .at(near_device())
            .with_device_slots(2)
            .with_capacity(1)
            .build();
        client.set_device_open(true);
        client.preload_device(vec![map(1), map(2)]);
        let mut device = DeviceProtocol::new(DeviceSettings::default());

        // The second move hits a full inventory.
        assert_eq!(device.clear_device(&client, clock.as_ref()), Ok(1));
        assert_eq!(client.device().loaded, vec![map(2)]);
    }

    #[test]
    fn activation_waits_for_closure() {
        let (clock, client, mut device) = setup(vec![map(1)]);
        client.set_device_open(true);
        device.place_item(&client, clock.as_ref(), &map(1)).unwrap();

        assert_eq!(
            device.activate_device(&client, clock.as_ref()),
            Ok(ActivationOutcome::Closed)
        );
        assert_eq!(device.phase(), DevicePhase::Closed);
        assert!(device.session().is_none());
        assert!(!client.device().open);
    }

    #[test]
    fn activation_that_stays_open_is_a_soft_warning() {
        let (clock, client, mut device) = setup(vec![map(1)]);
        client.set_device_open(true);
        client.set_faults(SimFaults {
            device_stays_open: true,
            ..SimFaults::default()
        });
        device.place_item(&client, clock.as_ref(), &map(1)).unwrap();

        assert_eq!(
            device.activate_device(&client, clock.as_ref()),
            Ok(ActivationOutcome::RemainedOpen)
        );
    }

    #[test]
    fn device_closing_during_settle_fails_activation() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone())
            .at(near_device())
            .with_inventory(vec![map(1)])
            .with_close_delay(Duration::from_millis(50))
            .build();
        client.set_device_open(true);
        let mut device = DeviceProtocol::new(DeviceSettings::default());
        device.place_item(&client, clock.as_ref(), &map(1)).unwrap();

        assert_eq!(
            device.activate_device(&client, clock.as_ref()),
            Err(DeviceError::ClosedBeforeActivation)
        );
        assert_eq!(device.phase(), DevicePhase::Failed);
    }

    #[test]
    fn activation_of_closed_device_is_not_ready() {
        let (clock, client, mut device) = setup(vec![]);
        assert!(matches!(
            device.activate_device(&client, clock.as_ref()),
            Err(DeviceError::NotReady(_))
        ));
    }

    #[test]
    fn ensure_item_ready_covers_every_outcome() {
        let matcher = ItemMatcher::from_settings(&DeviceSettings::default());

        let (clock, client, mut device) = setup(vec![map(1)]);
        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::DeviceNotOpen
        );

        client.set_device_open(true);
        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::Ready
        );
        let actions = client.action_count();
        // Already loaded: nothing more to do.
        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::Ready
        );
        assert_eq!(client.action_count(), actions);

        let (clock, client, mut device) = setup(vec![ItemRef::new(9, "Chaos Orb", 0)]);
        client.set_device_open(true);
        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::NeedExternalSupply
        );

        let (clock, client, mut device) = setup(vec![map(1)]);
        client.set_device_open(true);
        client.set_faults(SimFaults {
            move_item_is_noop: true,
            ..SimFaults::default()
        });
        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::InsertionFailed
        );

        let (clock, client, mut device) = setup(vec![map(2)]);
        client.set_device_open(true);
        client.preload_device(vec![ItemRef::new(8, "Chaos Orb", 0)]);
        assert!(matches!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::Error(_)
        ));
    }

    #[test]
    fn ensure_item_ready_loads_the_preferred_name_first() {
        let settings = DeviceSettings {
            item_names: vec!["Blighted".to_string(), "Map".to_string()],
            ..DeviceSettings::default()
        };
        let matcher = ItemMatcher::from_settings(&settings);
        let (clock, client, mut device) =
            setup(vec![map(1), ItemRef::new(3, "Blighted Tier 4 Map", 4)]);
        client.set_device_open(true);

        assert_eq!(
            device.ensure_item_ready(&client, clock.as_ref(), &matcher),
            ItemReadiness::Ready
        );
        let loaded: Vec<u64> = client.device().loaded.iter().map(|i| i.id).collect();
        assert_eq!(loaded, vec![3]);
        assert_eq!(client.inventory(), vec![map(1)]);
    }

    #[test]
    fn device_errors_map_onto_delve_errors() {
        let e: DelveError = DeviceError::Timeout {
            operation: "x",
            after: Duration::from_millis(1500),
        }
        .into();
        assert_eq!(
            e,
            DelveError::Timeout {
                operation: "x".to_string(),
                millis: 1500
            }
        );
        let e: DelveError = DeviceError::Action(ActionError::Busy).into();
        assert_eq!(e, DelveError::Action(ActionError::Busy));
    }
}
