use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::auth::Identity;
use crate::engine::{fee, lifecycle};
use crate::engine::lifecycle::NewOrder;
use crate::error::AppError;
use crate::models::order::{Location, OrderView, TrackingId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:tracking_id", get(get_order).delete(delete_order))
        .route("/orders/:tracking_id/accept", post(accept_order))
        .route("/orders/:tracking_id/pickup", post(mark_picked_up))
        .route("/orders/:tracking_id/confirm", post(confirm_delivery))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub tracking_id: String,
    pub pickup_location: Location,
    pub delivery_location: Location,
    pub item_description: String,
    pub weight: Option<f64>,
    pub preferred_delivery_time: Option<String>,
    pub special_instructions: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfirmDeliveryRequest {
    pub pin: String,
}

/// Order creation resolves the route distance up front (zero on lookup
/// failure, so placement never blocks on the mapping service), computes
/// the fee, and hands both to the engine as plain values. The response is
/// the creator's view and therefore carries the generated PIN.
async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    let tracking_id = TrackingId::parse(&payload.tracking_id)?;

    if payload.item_description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "item description cannot be empty".to_string(),
        ));
    }

    let distance_km = match state
        .distance
        .route_distance_km(
            &payload.pickup_location.coordinates,
            &payload.delivery_location.coordinates,
        )
        .await
    {
        Some(km) => km,
        None => {
            state.metrics.distance_fallbacks_total.inc();
            0.0
        }
    };
    let delivery_fee = fee::compute_fee(distance_km);

    let order = lifecycle::create_order(
        &state,
        &identity.subject,
        NewOrder {
            tracking_id,
            pickup_location: payload.pickup_location,
            delivery_location: payload.delivery_location,
            item_description: payload.item_description,
            weight: payload.weight,
            preferred_delivery_time: payload.preferred_delivery_time,
            special_instructions: payload.special_instructions,
            delivery_fee,
            distance_km,
        },
    )?;

    Ok(Json(order.view_for(&identity.subject)))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let views = lifecycle::list_orders_for(&state, &identity.subject)?;
    Ok(Json(views))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(tracking_id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let tracking_id = TrackingId::parse(&tracking_id)?;
    let view = lifecycle::get_order(&state, &identity.subject, &tracking_id)?;
    Ok(Json(view))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(tracking_id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let tracking_id = TrackingId::parse(&tracking_id)?;
    let view = lifecycle::accept_order(&state, &identity.subject, &tracking_id)?;
    Ok(Json(view))
}

async fn mark_picked_up(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(tracking_id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let tracking_id = TrackingId::parse(&tracking_id)?;
    let view = lifecycle::mark_picked_up(&state, &identity.subject, &tracking_id)?;
    Ok(Json(view))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(tracking_id): Path<String>,
    Json(payload): Json<ConfirmDeliveryRequest>,
) -> Result<Json<OrderView>, AppError> {
    let tracking_id = TrackingId::parse(&tracking_id)?;
    let view = lifecycle::confirm_delivery(&state, &identity.subject, &tracking_id, &payload.pin)?;
    Ok(Json(view))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(tracking_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let tracking_id = TrackingId::parse(&tracking_id)?;
    lifecycle::delete_order(&state, &identity.subject, &tracking_id)?;
    Ok(StatusCode::NO_CONTENT)
}
