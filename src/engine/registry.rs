use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::AppError;
use crate::models::role::{Role, RoleAssignment};
use crate::state::AppState;

/// First-write-wins registration. A repeated call for the same identity is
/// a silent no-op, not an error; the original record is never replaced.
/// Returns whether a record was inserted.
pub fn register_role(state: &AppState, user_id: &str, role: Role, phone_number: &str) -> bool {
    match state.roles.entry(user_id.to_string()) {
        Entry::Occupied(_) => {
            debug!(user_id, "role already registered; ignoring");
            false
        }
        Entry::Vacant(slot) => {
            slot.insert(RoleAssignment {
                user_id: user_id.to_string(),
                role,
                phone_number: phone_number.to_string(),
            });
            true
        }
    }
}

/// Missing records are an authentication-setup error, not retryable.
pub fn get_role(state: &AppState, user_id: &str) -> Result<Role, AppError> {
    state
        .roles
        .get(user_id)
        .map(|assignment| assignment.role)
        .ok_or_else(|| AppError::NotFound(format!("no role registered for {user_id}")))
}

pub fn get_assignment(state: &AppState, user_id: &str) -> Result<RoleAssignment, AppError> {
    state
        .roles
        .get(user_id)
        .map(|assignment| assignment.clone())
        .ok_or_else(|| AppError::NotFound(format!("no role registered for {user_id}")))
}
