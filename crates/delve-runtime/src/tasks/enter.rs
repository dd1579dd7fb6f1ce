//! [`EnterTask`] – prepare the apparatus and enter a new instance.
//!
//! An explicit stage machine re-entered every tick:
//!
//! ```text
//! OpenDevice ──▶ LoadItem ──▶ Activate ──▶ EnterPortal ──▶ (instance)
//!      ▲            │
//!      └── Supply ◀─┘  (no usable item in inventory)
//! ```
//!
//! Each call advances through as many stages as complete without waiting
//! for the next tick; a stage that issued a move returns
//! [`TaskStatus::Running`] and is resumed on the next call.

use std::time::Duration;

use delve_kernel::wait_for;
use delve_types::{AreaKind, DelveError, ObjectKind, Settings};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::device::{ActivationOutcome, DeviceError, DeviceProtocol, ItemReadiness, OpenOutcome};
use crate::matcher::ItemMatcher;
use crate::task::{Task, TaskServices, TaskStatus};

use super::stash::stashable;
use super::step_towards;
use super::supply::{SupplyOutcome, SupplyRoutine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterStage {
    OpenDevice,
    LoadItem,
    Supply,
    Activate,
    EnterPortal,
}

pub struct EnterTask {
    stage: EnterStage,
    device: DeviceProtocol,
    matcher: ItemMatcher,
    supply: SupplyRoutine,
    max_runs: u32,
    runs_started: u32,
    interact_range: f32,
    poll_interval: Duration,
    transition_timeout: Duration,
}

impl EnterTask {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            stage: EnterStage::OpenDevice,
            device: DeviceProtocol::new(settings.device.clone()),
            matcher: ItemMatcher::from_settings(&settings.device),
            supply: SupplyRoutine::from_settings(settings),
            max_runs: settings.max_runs,
            runs_started: 0,
            interact_range: settings.navigation.interact_range,
            poll_interval: settings.navigation.poll_interval(),
            transition_timeout: settings.navigation.transition_timeout(),
        }
    }

    pub fn stage(&self) -> EnterStage {
        self.stage
    }

    /// Instances entered by this task so far.
    pub fn runs_started(&self) -> u32 {
        self.runs_started
    }

    fn restart(&mut self) {
        self.stage = EnterStage::OpenDevice;
        self.device.abandon();
    }

    fn advance(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        let client = services.client;
        let clock = services.clock;
        loop {
            debug!(stage = ?self.stage, "enter stage");
            match self.stage {
                EnterStage::OpenDevice => match self.device.open_device(client, clock)? {
                    OpenOutcome::Approaching => return Ok(TaskStatus::Running),
                    OpenOutcome::Opened => self.stage = EnterStage::LoadItem,
                },
                EnterStage::LoadItem => {
                    match self.device.ensure_item_ready(client, clock, &self.matcher) {
                        ItemReadiness::Ready => self.stage = EnterStage::Activate,
                        ItemReadiness::NeedExternalSupply => self.stage = EnterStage::Supply,
                        ItemReadiness::DeviceNotOpen => self.stage = EnterStage::OpenDevice,
                        ItemReadiness::InsertionFailed => {
                            return Err(DelveError::NotReady(
                                "item insertion was not confirmed".to_string(),
                            ));
                        }
                        ItemReadiness::Error(reason) => {
                            let cleared = self.device.clear_device(client, clock)?;
                            warn!(%reason, cleared, "apparatus reset after load error");
                            return Err(DelveError::NotReady(reason));
                        }
                    }
                }
                EnterStage::Supply => {
                    // Positions changed since the context was captured.
                    let fresh = ExecutionContext::capture(client, None, ctx.tick);
                    match self.supply.fetch(client, clock, &fresh, &self.matcher)? {
                        SupplyOutcome::Approaching => return Ok(TaskStatus::Running),
                        SupplyOutcome::Retrieved(_) => self.stage = EnterStage::OpenDevice,
                        SupplyOutcome::Exhausted => {
                            self.restart();
                            return Err(DelveError::NotReady(
                                "no usable apparatus item in inventory or storage".to_string(),
                            ));
                        }
                    }
                }
                EnterStage::Activate => match self.device.activate_device(client, clock) {
                    Ok(ActivationOutcome::Closed | ActivationOutcome::RemainedOpen) => {
                        self.stage = EnterStage::EnterPortal;
                    }
                    Err(DeviceError::ClosedBeforeActivation) => {
                        self.restart();
                        return Err(DeviceError::ClosedBeforeActivation.into());
                    }
                    Err(e) => return Err(e.into()),
                },
                EnterStage::EnterPortal => {
                    let portal = client
                        .nearby_objects()
                        .into_iter()
                        .find(|o| o.kind == ObjectKind::InstancePortal)
                        .ok_or_else(|| {
                            DelveError::NotReady("instance portal not visible".to_string())
                        })?;
                    if step_towards(client, portal.position, self.interact_range)? {
                        return Ok(TaskStatus::Running);
                    }
                    client.interact(portal.id)?;
                    if !wait_for(clock, self.poll_interval, self.transition_timeout, || {
                        client.area() == AreaKind::Instance
                    }) {
                        return Err(DelveError::Timeout {
                            operation: "instance to load".to_string(),
                            millis: self.transition_timeout.as_millis(),
                        });
                    }
                    self.runs_started += 1;
                    self.stage = EnterStage::OpenDevice;
                    info!(run = self.runs_started, "entered instance");
                    return Ok(TaskStatus::Success);
                }
            }
        }
    }
}

impl Task for EnterTask {
    fn name(&self) -> &str {
        "enter"
    }

    fn is_eligible(&self, ctx: &ExecutionContext) -> bool {
        ctx.in_safe_area()
            && stashable(ctx, &self.matcher).next().is_none()
            && (self.max_runs == 0 || self.runs_started < self.max_runs)
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        self.advance(ctx, services)
    }
}
