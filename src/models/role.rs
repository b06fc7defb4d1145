use serde::{Deserialize, Serialize};

/// Caller classification. The identity provider hands this over as a claim
/// on the `user.created` event; modeling it as a closed enum keeps every
/// role check exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: Role,
    pub phone_number: String,
}
