use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;
use crate::geo::DistanceClient;
use crate::models::order::{Order, TrackingId};
use crate::models::role::RoleAssignment;
use crate::observability::metrics::Metrics;

/// Shared service state. Two keyed collections back the record store:
/// role assignments by user id, orders by tracking id. Per-entry shard
/// locks make guard-and-mutate on a single order indivisible.
pub struct AppState {
    pub roles: DashMap<String, RoleAssignment>,
    pub orders: DashMap<TrackingId, Order>,
    pub distance: DistanceClient,
    pub clock: Arc<dyn Clock>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(distance: DistanceClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            roles: DashMap::new(),
            orders: DashMap::new(),
            distance,
            clock,
            metrics: Metrics::new(),
        }
    }
}
