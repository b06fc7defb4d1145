use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::rest::auth::Identity;
use crate::engine::registry;
use crate::error::AppError;
use crate::models::role::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/user-created", post(user_created))
        .route("/profile", get(profile))
}

#[derive(Deserialize)]
struct IdentityEvent {
    data: IdentityEventData,
}

#[derive(Deserialize)]
struct IdentityEventData {
    id: String,
    metadata: IdentityMetadata,
}

#[derive(Deserialize)]
struct IdentityMetadata {
    role: Role,
    phone_number: String,
}

/// Identity-provider webhook. Only `user.created` events register a role;
/// every other event type is acknowledged untouched, so the envelope is
/// shape-checked only after the type gate. Redelivery of the same user is
/// a no-op.
async fn user_created(
    State(state): State<Arc<AppState>>,
    Json(event): Json<Value>,
) -> Result<StatusCode, AppError> {
    if event.get("type").and_then(Value::as_str) != Some("user.created") {
        return Ok(StatusCode::OK);
    }

    let event: IdentityEvent = serde_json::from_value(event)
        .map_err(|err| AppError::BadRequest(format!("malformed user.created event: {err}")))?;

    let inserted = registry::register_role(
        &state,
        &event.data.id,
        event.data.metadata.role,
        &event.data.metadata.phone_number,
    );
    if inserted {
        info!(user_id = %event.data.id, role = ?event.data.metadata.role, "role registered");
    }

    Ok(StatusCode::OK)
}

#[derive(Serialize)]
struct ProfileResponse {
    user_id: String,
    name: Option<String>,
    role: Role,
    phone_number: String,
}

async fn profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ProfileResponse>, AppError> {
    let assignment = registry::get_assignment(&state, &identity.subject)?;

    Ok(Json(ProfileResponse {
        user_id: assignment.user_id,
        name: identity.name,
        role: assignment.role,
        phone_number: assignment.phone_number,
    }))
}
