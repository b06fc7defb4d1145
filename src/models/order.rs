use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
}

/// Customer-facing order handle: `BE` followed by eight base36 characters,
/// stored uppercased. Distinct from the internal record id and never
/// regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingId(String);

impl TrackingId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let candidate = raw.trim().to_ascii_uppercase();
        let suffix = candidate.strip_prefix("BE").ok_or_else(|| {
            AppError::BadRequest(format!("tracking id must start with BE: {raw}"))
        })?;

        let valid = suffix.len() == 8
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
        if !valid {
            return Err(AppError::BadRequest(format!(
                "tracking id must be BE followed by 8 base36 characters: {raw}"
            )));
        }

        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingId> for String {
    fn from(id: TrackingId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tracking_id: TrackingId,
    pub customer_id: String,
    pub driver_id: Option<String>,
    pub pickup_location: Location,
    pub delivery_location: Location,
    pub item_description: String,
    pub weight: Option<f64>,
    pub preferred_delivery_time: Option<String>,
    pub special_instructions: Option<String>,
    pub delivery_fee: f64,
    pub distance_km: f64,
    pub status: OrderStatus,
    pub delivery_pin: String,
    pub pickup_timestamp: Option<DateTime<Utc>>,
    pub delivery_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Caller-facing read model. The delivery PIN is present only when the
/// reader is the customer who created the order; driver reads always
/// redact it. The internal record id is not exposed at all.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub tracking_id: TrackingId,
    pub customer_id: String,
    pub driver_id: Option<String>,
    pub pickup_location: Location,
    pub delivery_location: Location,
    pub item_description: String,
    pub weight: Option<f64>,
    pub preferred_delivery_time: Option<String>,
    pub special_instructions: Option<String>,
    pub delivery_fee: f64,
    pub distance_km: f64,
    pub status: OrderStatus,
    pub delivery_pin: Option<String>,
    pub pickup_timestamp: Option<DateTime<Utc>>,
    pub delivery_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn view_for(&self, caller_id: &str) -> OrderView {
        let delivery_pin = if self.customer_id == caller_id {
            Some(self.delivery_pin.clone())
        } else {
            None
        };

        OrderView {
            tracking_id: self.tracking_id.clone(),
            customer_id: self.customer_id.clone(),
            driver_id: self.driver_id.clone(),
            pickup_location: self.pickup_location.clone(),
            delivery_location: self.delivery_location.clone(),
            item_description: self.item_description.clone(),
            weight: self.weight,
            preferred_delivery_time: self.preferred_delivery_time.clone(),
            special_instructions: self.special_instructions.clone(),
            delivery_fee: self.delivery_fee,
            distance_km: self.distance_km,
            status: self.status,
            delivery_pin,
            pickup_timestamp: self.pickup_timestamp,
            delivery_timestamp: self.delivery_timestamp,
            created_at: self.created_at,
        }
    }
}
