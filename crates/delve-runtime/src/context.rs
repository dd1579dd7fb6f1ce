//! [`ExecutionContext`] – the per-tick snapshot of observed facts.
//!
//! The orchestrator captures a fresh context at the start of every
//! scheduling pass and hands the same immutable value to every eligibility
//! predicate and to the task that runs.  Nothing in the context is ever
//! updated in place; a task that needs post-action state queries the client
//! again.

use std::sync::Arc;

use delve_hal::StateQuery;
use delve_pricing::{CacheSnapshot, PriceCache};
use delve_types::{
    AreaKind, DeviceState, InstanceCounters, ItemRef, ObjectKind, Position, WorldObject,
};

/// Read-only facts observed at the start of one tick.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Monotonic scheduling pass counter.
    pub tick: u64,
    pub position: Position,
    pub area: AreaKind,
    pub inventory: Vec<ItemRef>,
    pub inventory_capacity: usize,
    pub conditions: Vec<String>,
    pub counters: InstanceCounters,
    pub device: DeviceState,
    pub overlay_open: bool,
    pub nearby: Vec<WorldObject>,
    /// Price snapshot active when the context was captured.  Reading it never
    /// schedules a refresh.
    pub prices: Option<Arc<CacheSnapshot>>,
}

impl ExecutionContext {
    /// Query every fact from `client` once.
    pub fn capture<Q>(client: &Q, prices: Option<&PriceCache>, tick: u64) -> Self
    where
        Q: StateQuery + ?Sized,
    {
        Self {
            tick,
            position: client.position(),
            area: client.area(),
            inventory: client.inventory(),
            inventory_capacity: client.inventory_capacity(),
            conditions: client.status_conditions(),
            counters: client.counters(),
            device: client.device(),
            overlay_open: client.overlay_open(),
            nearby: client.nearby_objects(),
            prices: prices.map(PriceCache::snapshot),
        }
    }

    pub fn in_instance(&self) -> bool {
        self.area == AreaKind::Instance
    }

    pub fn in_safe_area(&self) -> bool {
        self.area == AreaKind::Safe
    }

    pub fn inventory_full(&self) -> bool {
        self.inventory.len() >= self.inventory_capacity
    }

    /// `true` once no objective of the current instance remains.
    pub fn instance_complete(&self) -> bool {
        self.counters.objectives_remaining == 0
    }

    /// First nearby object whose kind satisfies `predicate`.
    pub fn find(&self, predicate: impl Fn(&ObjectKind) -> bool) -> Option<&WorldObject> {
        self.nearby.iter().find(|o| predicate(&o.kind))
    }

    /// Nearest object whose kind satisfies `predicate`.
    pub fn nearest(&self, predicate: impl Fn(&ObjectKind) -> bool) -> Option<&WorldObject> {
        self.nearby
            .iter()
            .filter(|o| predicate(&o.kind))
            .min_by(|a, b| {
                self.distance_to(&a.position)
                    .total_cmp(&self.distance_to(&b.position))
            })
    }

    /// Distance from the player to `point`.
    pub fn distance_to(&self, point: &Position) -> f32 {
        self.position.distance_to(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_hal::sim::{DEVICE_ID, EXIT_PORTAL_ID, SimClient};
    use delve_kernel::clock::ManualClock;

    #[test]
    fn capture_reflects_safe_area() {
        let client = SimClient::builder(Arc::new(ManualClock::new()))
            .with_inventory(vec![ItemRef::new(1, "Tier 5 Map", 5)])
            .with_capacity(1)
            .build();
        let ctx = ExecutionContext::capture(&client, None, 7);

        assert_eq!(ctx.tick, 7);
        assert!(ctx.in_safe_area());
        assert!(ctx.inventory_full());
        assert!(ctx.prices.is_none());
        let device = ctx.find(|k| *k == ObjectKind::Device).unwrap();
        assert_eq!(device.id, DEVICE_ID);
    }

    #[test]
    fn nearest_orders_by_distance() {
        let client = SimClient::builder(Arc::new(ManualClock::new()))
            .in_instance()
            .build();
        let ctx = ExecutionContext::capture(&client, None, 0);

        assert!(ctx.in_instance());
        assert!(!ctx.instance_complete());
        // The exit portal (3 away) is closer than the first objective (8 away).
        let nearest = ctx.nearest(|_| true).unwrap();
        assert_eq!(nearest.id, EXIT_PORTAL_ID);
        let objective = ctx.nearest(|k| *k == ObjectKind::Objective).unwrap();
        assert_eq!(objective.position, Position::new(8.0, 0.0));
    }

    #[test]
    fn context_is_a_snapshot() {
        let client = SimClient::builder(Arc::new(ManualClock::new())).build();
        let ctx = ExecutionContext::capture(&client, None, 0);
        client.set_position(Position::new(5.0, 5.0));
        assert_eq!(ctx.position, Position::default());
    }
}
