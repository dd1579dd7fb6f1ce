//! [`LootTask`] – pick up worthwhile ground items inside an instance.

use std::collections::HashSet;
use std::time::Duration;

use delve_kernel::wait_for;
use delve_types::{DelveError, ItemRef, ObjectId, ObjectKind, Position, Settings};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::matcher::LootFilter;
use crate::task::{Task, TaskServices, TaskStatus};

use super::step_towards;

pub struct LootTask {
    filter: LootFilter,
    pickup_range: f32,
    interact_range: f32,
    poll_interval: Duration,
    pickup_timeout: Duration,
    /// Loot whose pickup could not be confirmed; never retried.
    abandoned: HashSet<ObjectId>,
}

impl LootTask {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            filter: LootFilter::from_settings(&settings.loot),
            pickup_range: settings.loot.pickup_range,
            interact_range: settings.navigation.interact_range,
            poll_interval: settings.navigation.poll_interval(),
            pickup_timeout: settings.loot.pickup_timeout(),
            abandoned: HashSet::new(),
        }
    }

    /// Nearest accepted loot within pickup range.
    fn candidate(&self, ctx: &ExecutionContext) -> Option<(ObjectId, ItemRef, Position)> {
        ctx.nearby
            .iter()
            .filter(|o| !self.abandoned.contains(&o.id))
            .filter(|o| ctx.distance_to(&o.position) <= self.pickup_range)
            .filter_map(|o| match &o.kind {
                ObjectKind::Loot { item }
                    if self.filter.evaluate(item, ctx.prices.as_deref()).accepted() =>
                {
                    Some((o.id, item.clone(), o.position))
                }
                _ => None,
            })
            .min_by(|a, b| ctx.distance_to(&a.2).total_cmp(&ctx.distance_to(&b.2)))
    }
}

impl Task for LootTask {
    fn name(&self) -> &str {
        "loot"
    }

    fn is_eligible(&self, ctx: &ExecutionContext) -> bool {
        ctx.in_instance() && !ctx.inventory_full() && self.candidate(ctx).is_some()
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        services: &mut TaskServices<'_>,
    ) -> Result<TaskStatus, DelveError> {
        let Some((id, item, at)) = self.candidate(ctx) else {
            return Ok(TaskStatus::Failure);
        };

        let decision = self.filter.evaluate_live(&item, services.prices);
        if !decision.accepted() {
            debug!(item = %item.name, ?decision, "loot no longer worth picking up");
            self.abandoned.insert(id);
            return Ok(TaskStatus::Failure);
        }

        let client = services.client;
        if step_towards(client, at, self.interact_range)? {
            return Ok(TaskStatus::Running);
        }

        let before = client.inventory().len();
        client.interact(id)?;
        if wait_for(services.clock, self.poll_interval, self.pickup_timeout, || {
            client.inventory().len() > before
        }) {
            info!(item = %item.name, ?decision, "picked up");
            Ok(TaskStatus::Success)
        } else {
            self.abandoned.insert(id);
            Err(DelveError::Timeout {
                operation: format!("pickup of {}", item.name),
                millis: self.pickup_timeout.as_millis(),
            })
        }
    }
}
