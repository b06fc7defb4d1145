use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;
use crate::models::order::Coordinates;

/// Client for the external distance-matrix service. Every failure mode
/// (unconfigured endpoint, transport error, non-OK route status, malformed
/// body) is absorbed into `None`; the caller falls back to zero distance
/// so order placement never blocks on the mapping service.
pub struct DistanceClient {
    http: Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    rows: Vec<DistanceRow>,
}

#[derive(Debug, Deserialize)]
struct DistanceRow {
    elements: Vec<DistanceElement>,
}

#[derive(Debug, Deserialize)]
struct DistanceElement {
    status: String,
    distance: Option<DistanceValue>,
}

#[derive(Debug, Deserialize)]
struct DistanceValue {
    /// Route length in meters.
    value: f64,
}

impl DistanceClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Client with no endpoint configured: every lookup is a fallback.
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            base_url: None,
            api_key: None,
        }
    }

    pub async fn route_distance_km(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
    ) -> Option<f64> {
        let base_url = self.base_url.as_deref()?;

        match self.fetch(base_url, origin, destination).await {
            Ok(Some(km)) => Some(km),
            Ok(None) => {
                warn!("distance service returned no route");
                None
            }
            Err(err) => {
                warn!(error = %err, "distance lookup failed");
                None
            }
        }
    }

    async fn fetch(
        &self,
        base_url: &str,
        origin: &Coordinates,
        destination: &Coordinates,
    ) -> Result<Option<f64>, reqwest::Error> {
        let mut request = self.http.get(base_url).query(&[
            ("origins", format!("{},{}", origin.lat, origin.lng)),
            (
                "destinations",
                format!("{},{}", destination.lat, destination.lng),
            ),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await?.error_for_status()?;
        let body: DistanceMatrixResponse = response.json().await?;
        Ok(route_distance_from(&body))
    }
}

/// First route element of the matrix, meters converted to km. Anything
/// other than an `OK` element with a distance yields `None`.
fn route_distance_from(body: &DistanceMatrixResponse) -> Option<f64> {
    let element = body.rows.first()?.elements.first()?;
    if element.status != "OK" {
        return None;
    }
    Some(element.distance.as_ref()?.value / 1000.0)
}
