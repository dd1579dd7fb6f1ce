//! [`ClearTask`] – approach and defeat the remaining objectives.
//!
//! The task owns a [`StuckDetector`] for the objective currently being
//! approached.  When the detector fires, the failure is reported to the
//! breaker, an evasive key is pressed and detection starts over.

use delve_kernel::StuckDetector;
use delve_types::{DelveError, KeyCode, ObjectId, ObjectKind, Settings};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::task::{Task, TaskServices, TaskStatus};

pub struct ClearTask {
    engage_range: f32,
    detector: StuckDetector,
    target: Option<ObjectId>,
}

impl ClearTask {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            engage_range: settings.navigation.engage_range,
            detector: StuckDetector::from_settings(&settings.stuck),
            target: None,
        }
    }
}

impl Task for ClearTask {
    fn name(&self) -> &str {
        "clear"
    }

    fn is_eligible(&self, ctx: &ExecutionContext) -> bool {
        ctx.in_instance() && !ctx.instance_complete()
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        let objective = ctx
            .nearest(|k| *k == ObjectKind::Objective)
            .ok_or_else(|| DelveError::NotReady("no objective visible".to_string()))?;

        if self.target != Some(objective.id) {
            debug!(id = objective.id, "new objective");
            self.target = Some(objective.id);
            self.detector.reset();
        }

        let client = services.client;
        if ctx.distance_to(&objective.position) > self.engage_range {
            if self.detector.update(ctx.position, &ctx.conditions) {
                let ticks = self.detector.no_progress_ticks();
                warn!(ticks, "no progress towards objective; dodging");
                services
                    .breaker
                    .report_error("no movement while approaching objective");
                client.press_key(KeyCode::Dodge)?;
                self.detector.reset();
                return Ok(TaskStatus::Running);
            }
            client.move_towards(objective.position)?;
            return Ok(TaskStatus::Running);
        }

        self.detector.reset();
        client.press_key(KeyCode::PrimarySkill)?;
        if client.counters().objectives_remaining == 0 {
            info!("instance cleared");
            self.target = None;
            return Ok(TaskStatus::Success);
        }
        Ok(TaskStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use delve_hal::sim::{SimAction, SimClient};
    use delve_hal::StateQuery;
    use delve_kernel::{ErrorBreaker, ManualClock};

    fn tick(
        task: &mut ClearTask,
        client: &SimClient,
        clock: &ManualClock,
        breaker: &mut ErrorBreaker,
    ) -> Result<TaskStatus, DelveError> {
        let ctx = ExecutionContext::capture(client, None, 0);
        let mut services = TaskServices {
            client,
            clock,
            breaker,
            prices: None,
        };
        task.execute(&ctx, &mut services)
    }

    #[test]
    fn clears_single_objective() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone())
            .with_objectives(1)
            .in_instance()
            .build();
        let mut breaker = ErrorBreaker::new(10, Duration::from_secs(120), clock.clone());
        let mut task = ClearTask::from_settings(&Settings::default());

        // Objective at (8, 0): two steps to engage range, then one skill use.
        assert_eq!(tick(&mut task, &client, &clock, &mut breaker), Ok(TaskStatus::Running));
        assert_eq!(tick(&mut task, &client, &clock, &mut breaker), Ok(TaskStatus::Running));
        assert_eq!(tick(&mut task, &client, &clock, &mut breaker), Ok(TaskStatus::Success));
        assert_eq!(client.counters().completed, 1);
        assert!(!task.is_eligible(&ExecutionContext::capture(&client, None, 0)));
    }

    #[test]
    fn immobilising_condition_suppresses_stuck_detection() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone()).in_instance().build();
        client.set_faults(delve_hal::SimFaults {
            movement_blocked: true,
            ..Default::default()
        });
        client.set_conditions(vec!["Frozen".to_string()]);
        let mut breaker = ErrorBreaker::new(10, Duration::from_secs(120), clock.clone());
        let mut task = ClearTask::from_settings(&Settings::default());

        for _ in 0..50 {
            tick(&mut task, &client, &clock, &mut breaker).unwrap();
        }
        assert!(!client.actions().contains(&SimAction::PressKey(KeyCode::Dodge)));
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn missing_objective_is_an_error() {
        let clock = Arc::new(ManualClock::new());
        let client = SimClient::builder(clock.clone()).build();
        let mut breaker = ErrorBreaker::new(10, Duration::from_secs(120), clock.clone());
        let mut task = ClearTask::from_settings(&Settings::default());
        assert!(matches!(
            tick(&mut task, &client, &clock, &mut breaker),
            Err(DelveError::NotReady(_))
        ));
    }
}
