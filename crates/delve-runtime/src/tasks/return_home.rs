//! [`ReturnTask`] – leave the instance through the exit portal.

use std::time::Duration;

use delve_kernel::wait_for;
use delve_types::{AreaKind, DelveError, ObjectKind, Settings};
use tracing::info;

use crate::context::ExecutionContext;
use crate::task::{Task, TaskServices, TaskStatus};

use super::step_towards;

pub struct ReturnTask {
    interact_range: f32,
    poll_interval: Duration,
    transition_timeout: Duration,
}

impl ReturnTask {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interact_range: settings.navigation.interact_range,
            poll_interval: settings.navigation.poll_interval(),
            transition_timeout: settings.navigation.transition_timeout(),
        }
    }
}

impl Task for ReturnTask {
    fn name(&self) -> &str {
        "return"
    }

    fn is_eligible(&self, ctx: &ExecutionContext) -> bool {
        ctx.in_instance() && (ctx.inventory_full() || ctx.instance_complete())
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        let exit = ctx
            .find(|k| *k == ObjectKind::ExitPortal)
            .ok_or_else(|| DelveError::NotReady("exit portal not visible".to_string()))?;

        let client = services.client;
        if step_towards(client, exit.position, self.interact_range)? {
            return Ok(TaskStatus::Running);
        }

        client.interact(exit.id)?;
        if wait_for(services.clock, self.poll_interval, self.transition_timeout, || {
            client.area() == AreaKind::Safe
        }) {
            info!(full = ctx.inventory_full(), "returned to safe area");
            Ok(TaskStatus::Success)
        } else {
            Err(DelveError::Timeout {
                operation: "return to safe area".to_string(),
                millis: self.transition_timeout.as_millis(),
            })
        }
    }
}
