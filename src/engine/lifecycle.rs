use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

use crate::engine::{pin, registry};
use crate::error::AppError;
use crate::models::order::{Location, Order, OrderStatus, OrderView, TrackingId};
use crate::models::role::Role;
use crate::state::AppState;

/// Creation input. Fee and distance are resolved by the caller before the
/// engine runs so the distance lookup never holds an order lock.
pub struct NewOrder {
    pub tracking_id: TrackingId,
    pub pickup_location: Location,
    pub delivery_location: Location,
    pub item_description: String,
    pub weight: Option<f64>,
    pub preferred_delivery_time: Option<String>,
    pub special_instructions: Option<String>,
    pub delivery_fee: f64,
    pub distance_km: f64,
}

pub fn create_order(
    state: &AppState,
    customer_id: &str,
    new_order: NewOrder,
) -> Result<Order, AppError> {
    if registry::get_role(state, customer_id)? != Role::Customer {
        return Err(AppError::Forbidden(
            "only customers can create orders".to_string(),
        ));
    }

    let order = Order {
        id: Uuid::new_v4(),
        tracking_id: new_order.tracking_id,
        customer_id: customer_id.to_string(),
        driver_id: None,
        pickup_location: new_order.pickup_location,
        delivery_location: new_order.delivery_location,
        item_description: new_order.item_description,
        weight: new_order.weight,
        preferred_delivery_time: new_order.preferred_delivery_time,
        special_instructions: new_order.special_instructions,
        delivery_fee: new_order.delivery_fee,
        distance_km: new_order.distance_km,
        status: OrderStatus::Pending,
        delivery_pin: pin::generate_pin(),
        pickup_timestamp: None,
        delivery_timestamp: None,
        created_at: state.clock.now(),
    };

    // Insert-if-vacant keeps tracking ids unique under concurrent creation.
    match state.orders.entry(order.tracking_id.clone()) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict(format!(
                "tracking id {} already exists",
                order.tracking_id
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(order.clone());
        }
    }

    state.metrics.orders_created_total.inc();
    info!(
        tracking_id = %order.tracking_id,
        customer_id,
        fee = order.delivery_fee,
        distance_km = order.distance_km,
        "order created"
    );

    Ok(order)
}

/// Scoped listing. Drivers see every pending order plus anything assigned
/// to them; customers see their own orders. Views are redacted per reader.
pub fn list_orders_for(state: &AppState, caller_id: &str) -> Result<Vec<OrderView>, AppError> {
    let role = registry::get_role(state, caller_id)?;

    let mut views: Vec<OrderView> = state
        .orders
        .iter()
        .filter_map(|entry| {
            let order = entry.value();
            let visible = match role {
                Role::Customer => order.customer_id == caller_id,
                Role::Driver => {
                    order.status == OrderStatus::Pending
                        || order.driver_id.as_deref() == Some(caller_id)
                }
            };

            visible.then(|| order.view_for(caller_id))
        })
        .collect();

    views.sort_by_key(|view| view.created_at);
    Ok(views)
}

/// Single-order read under the same scoping rule as the listing. An order
/// outside the caller's scope reads as absent.
pub fn get_order(
    state: &AppState,
    caller_id: &str,
    tracking_id: &TrackingId,
) -> Result<OrderView, AppError> {
    let role = registry::get_role(state, caller_id)?;

    let order = state
        .orders
        .get(tracking_id)
        .ok_or_else(|| AppError::NotFound(format!("order {tracking_id} not found")))?;

    let visible = match role {
        Role::Customer => order.customer_id == caller_id,
        Role::Driver => {
            order.status == OrderStatus::Pending || order.driver_id.as_deref() == Some(caller_id)
        }
    };
    if !visible {
        return Err(AppError::NotFound(format!("order {tracking_id} not found")));
    }

    Ok(order.view_for(caller_id))
}

/// First accept wins. The guard and the assignment run while `get_mut`
/// holds the entry's exclusive lock, so concurrent accepts on one tracking
/// id serialize here: the loser observes the winner's driver id and fails
/// with `Conflict` instead of silently overwriting it.
pub fn accept_order(
    state: &AppState,
    driver_id: &str,
    tracking_id: &TrackingId,
) -> Result<OrderView, AppError> {
    if registry::get_role(state, driver_id)? != Role::Driver {
        return Err(AppError::Forbidden(
            "only drivers can accept orders".to_string(),
        ));
    }

    let mut order = state
        .orders
        .get_mut(tracking_id)
        .ok_or_else(|| AppError::NotFound(format!("order {tracking_id} not found")))?;

    if order.driver_id.is_some() || order.status != OrderStatus::Pending {
        state.metrics.record_transition("accept", "conflict");
        return Err(AppError::Conflict(format!(
            "order {tracking_id} is already assigned"
        )));
    }

    order.driver_id = Some(driver_id.to_string());
    order.status = OrderStatus::Assigned;

    state.metrics.record_transition("accept", "success");
    info!(tracking_id = %tracking_id, driver_id, "order assigned");

    Ok(order.view_for(driver_id))
}

pub fn mark_picked_up(
    state: &AppState,
    driver_id: &str,
    tracking_id: &TrackingId,
) -> Result<OrderView, AppError> {
    let mut order = state
        .orders
        .get_mut(tracking_id)
        .ok_or_else(|| AppError::NotFound(format!("order {tracking_id} not found")))?;

    if order.status != OrderStatus::Assigned {
        return Err(AppError::InvalidState(format!(
            "cannot mark pickup while order is {:?}",
            order.status
        )));
    }
    if order.driver_id.as_deref() != Some(driver_id) {
        return Err(AppError::Forbidden(
            "order is not assigned to this driver".to_string(),
        ));
    }

    order.status = OrderStatus::PickedUp;
    order.pickup_timestamp = Some(state.clock.now());

    state.metrics.record_transition("pickup", "success");
    info!(tracking_id = %tracking_id, driver_id, "order picked up");

    Ok(order.view_for(driver_id))
}

/// Ownership is checked before state or PIN so an unassigned caller gets a
/// uniform `Forbidden` and learns nothing else. `InvalidPin` is reserved
/// for the assigned driver with a wrong code; a failed attempt leaves the
/// order untouched.
pub fn confirm_delivery(
    state: &AppState,
    driver_id: &str,
    tracking_id: &TrackingId,
    pin: &str,
) -> Result<OrderView, AppError> {
    let mut order = state
        .orders
        .get_mut(tracking_id)
        .ok_or_else(|| AppError::NotFound(format!("order {tracking_id} not found")))?;

    if order.driver_id.as_deref() != Some(driver_id) {
        return Err(AppError::Forbidden(
            "order is not assigned to this driver".to_string(),
        ));
    }
    if order.status != OrderStatus::PickedUp {
        return Err(AppError::InvalidState(format!(
            "cannot confirm delivery while order is {:?}",
            order.status
        )));
    }
    if order.delivery_pin != pin {
        state.metrics.record_transition("confirm", "invalid_pin");
        return Err(AppError::InvalidPin);
    }

    order.status = OrderStatus::Delivered;
    order.delivery_timestamp = Some(state.clock.now());

    if let (Some(picked_up), Some(delivered)) = (order.pickup_timestamp, order.delivery_timestamp) {
        let seconds = (delivered - picked_up).num_milliseconds() as f64 / 1000.0;
        state
            .metrics
            .delivery_duration_seconds
            .observe(seconds.max(0.0));
    }

    state.metrics.record_transition("confirm", "success");
    info!(tracking_id = %tracking_id, driver_id, "delivery confirmed");

    Ok(order.view_for(driver_id))
}

/// Hard delete, creator only, and only before pickup. Guard and removal
/// run under the entry lock as one step.
pub fn delete_order(
    state: &AppState,
    customer_id: &str,
    tracking_id: &TrackingId,
) -> Result<(), AppError> {
    match state.orders.entry(tracking_id.clone()) {
        Entry::Vacant(_) => Err(AppError::NotFound(format!(
            "order {tracking_id} not found"
        ))),
        Entry::Occupied(slot) => {
            let order = slot.get();
            if order.customer_id != customer_id {
                return Err(AppError::Forbidden(
                    "only the creating customer can delete an order".to_string(),
                ));
            }
            if !matches!(order.status, OrderStatus::Pending | OrderStatus::Assigned) {
                return Err(AppError::InvalidState(format!(
                    "cannot delete order in status {:?}",
                    order.status
                )));
            }

            slot.remove();
            state.metrics.record_transition("delete", "success");
            info!(tracking_id = %tracking_id, customer_id, "order deleted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::fee::compute_fee;
    use crate::geo::DistanceClient;

    fn start_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn test_state() -> (AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let state = AppState::new(DistanceClient::disabled(), clock.clone());
        (state, clock)
    }

    fn register(state: &AppState, user_id: &str, role: Role) {
        registry::register_role(state, user_id, role, "+15550001234");
    }

    fn location(address: &str) -> Location {
        Location {
            address: address.to_string(),
            coordinates: crate::models::order::Coordinates {
                lat: 6.5244,
                lng: 3.3792,
            },
        }
    }

    fn new_order(tracking_id: &str, distance_km: f64) -> NewOrder {
        NewOrder {
            tracking_id: TrackingId::parse(tracking_id).unwrap(),
            pickup_location: location("12 Marina Rd"),
            delivery_location: location("4 Harbor View"),
            item_description: "documents".to_string(),
            weight: Some(0.4),
            preferred_delivery_time: None,
            special_instructions: None,
            delivery_fee: compute_fee(distance_km),
            distance_km,
        }
    }

    #[test]
    fn created_order_is_pending_and_unassigned() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 5.0)).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.driver_id.is_none());
        assert_eq!(order.delivery_fee, 1000.0);
        assert_eq!(order.created_at, start_time());
        assert_eq!(order.delivery_pin.len(), 4);
        assert!(order.delivery_pin.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn drivers_cannot_create_orders() {
        let (state, _clock) = test_state();
        register(&state, "drv-1", Role::Driver);

        let err = create_order(&state, "drv-1", new_order("BE00000001", 1.0)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn duplicate_tracking_id_is_a_conflict() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);

        create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        let err = create_order(&state, "cust-1", new_order("BE00000001", 2.0)).unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn second_accept_loses_with_conflict() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);
        register(&state, "drv-b", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();

        let accepted = accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        assert_eq!(accepted.status, OrderStatus::Assigned);
        assert_eq!(accepted.driver_id.as_deref(), Some("drv-a"));

        let err = accept_order(&state, "drv-b", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = state.orders.get(&order.tracking_id).unwrap();
        assert_eq!(stored.driver_id.as_deref(), Some("drv-a"));
    }

    #[test]
    fn concurrent_accepts_have_exactly_one_winner() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        for i in 0..8 {
            register(&state, &format!("drv-{i}"), Role::Driver);
        }

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();

        let results: Vec<Result<OrderView, AppError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let state = &state;
                    let tracking_id = &order.tracking_id;
                    scope.spawn(move || accept_order(state, &format!("drv-{i}"), tracking_id))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().expect("accept thread"))
                .collect()
        });

        let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(winners.len(), 1);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, AppError::Conflict(_)));
            }
        }

        let stored = state.orders.get(&order.tracking_id).unwrap();
        assert_eq!(stored.status, OrderStatus::Assigned);
        let winner_id = stored.driver_id.clone().unwrap();
        assert!((0..8).any(|i| winner_id == format!("drv-{i}")));
    }

    #[test]
    fn customers_cannot_accept() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        let err = accept_order(&state, "cust-1", &order.tracking_id).unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn pickup_requires_assigned_status() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();

        // still pending
        let err = mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap();
        confirm_delivery(
            &state,
            "drv-a",
            &order.tracking_id,
            &pin_of(&state, &order.tracking_id),
        )
        .unwrap();

        // delivered is terminal
        let err = mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn pickup_by_other_driver_is_forbidden() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);
        register(&state, "drv-b", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();

        let err = mark_picked_up(&state, "drv-b", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn wrong_pin_is_rejected_and_order_unchanged() {
        let (state, clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap();

        let wrong_pin = if order.delivery_pin == "0000" { "0001" } else { "0000" };
        clock.advance(Duration::minutes(10));

        let err = confirm_delivery(&state, "drv-a", &order.tracking_id, wrong_pin).unwrap_err();
        assert!(matches!(err, AppError::InvalidPin));

        let stored = state.orders.get(&order.tracking_id).unwrap();
        assert_eq!(stored.status, OrderStatus::PickedUp);
        assert!(stored.delivery_timestamp.is_none());
    }

    #[test]
    fn unassigned_driver_confirming_gets_forbidden_not_invalid_pin() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);
        register(&state, "drv-b", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap();

        let err =
            confirm_delivery(&state, "drv-b", &order.tracking_id, "0000").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn timestamps_come_from_the_injected_clock() {
        let (state, clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();

        clock.advance(Duration::minutes(5));
        let picked = mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap();
        assert_eq!(
            picked.pickup_timestamp,
            Some(start_time() + Duration::minutes(5))
        );

        clock.advance(Duration::minutes(30));
        let delivered = confirm_delivery(
            &state,
            "drv-a",
            &order.tracking_id,
            &pin_of(&state, &order.tracking_id),
        )
        .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(
            delivered.delivery_timestamp,
            Some(start_time() + Duration::minutes(35))
        );
    }

    #[test]
    fn delete_allowed_only_before_pickup() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "drv-a", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        delete_order(&state, "cust-1", &order.tracking_id).unwrap();
        assert!(state.orders.get(&order.tracking_id).is_none());

        let order = create_order(&state, "cust-1", new_order("BE00000002", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        delete_order(&state, "cust-1", &order.tracking_id).unwrap();

        let order = create_order(&state, "cust-1", new_order("BE00000003", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();
        mark_picked_up(&state, "drv-a", &order.tracking_id).unwrap();

        let err = delete_order(&state, "cust-1", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(state.orders.get(&order.tracking_id).is_some());
    }

    #[test]
    fn delete_by_non_creator_is_forbidden() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "cust-2", Role::Customer);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        let err = delete_order(&state, "cust-2", &order.tracking_id).unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn listing_scopes_by_role_and_redacts_the_pin() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "cust-2", Role::Customer);
        register(&state, "drv-a", Role::Driver);
        register(&state, "drv-b", Role::Driver);

        let first = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        create_order(&state, "cust-2", new_order("BE00000002", 2.0)).unwrap();
        accept_order(&state, "drv-a", &first.tracking_id).unwrap();

        // drv-a: own assigned order plus the remaining pending one
        let for_a = list_orders_for(&state, "drv-a").unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|view| view.delivery_pin.is_none()));

        // drv-b: only the pending order; cust-1's assigned order is gone
        let for_b = list_orders_for(&state, "drv-b").unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].tracking_id.as_str(), "BE00000002");

        // customers see exactly their own, PIN included
        let for_cust = list_orders_for(&state, "cust-1").unwrap();
        assert_eq!(for_cust.len(), 1);
        assert_eq!(for_cust[0].tracking_id.as_str(), "BE00000001");
        assert!(for_cust[0].delivery_pin.is_some());
    }

    #[test]
    fn single_read_applies_the_same_scope() {
        let (state, _clock) = test_state();
        register(&state, "cust-1", Role::Customer);
        register(&state, "cust-2", Role::Customer);
        register(&state, "drv-a", Role::Driver);
        register(&state, "drv-b", Role::Driver);

        let order = create_order(&state, "cust-1", new_order("BE00000001", 1.0)).unwrap();
        accept_order(&state, "drv-a", &order.tracking_id).unwrap();

        assert!(get_order(&state, "cust-1", &order.tracking_id).is_ok());
        assert!(get_order(&state, "drv-a", &order.tracking_id).is_ok());

        // assigned elsewhere: invisible to other drivers and customers
        let err = get_order(&state, "drv-b", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = get_order(&state, "cust-2", &order.tracking_id).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn pin_of(state: &AppState, tracking_id: &TrackingId) -> String {
        state
            .orders
            .get(tracking_id)
            .map(|order| order.delivery_pin.clone())
            .unwrap()
    }
}
