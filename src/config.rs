use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Distance-matrix endpoint. Unset disables lookups and every order
    /// falls back to the base fee.
    pub distance_api_url: Option<String>,
    /// Opaque credential for the distance service.
    pub distance_api_key: Option<String>,
    pub distance_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            distance_api_url: env::var("DISTANCE_API_URL").ok(),
            distance_api_key: env::var("DISTANCE_API_KEY").ok(),
            distance_timeout: Duration::from_millis(parse_or_default("DISTANCE_TIMEOUT_MS", 2_000)?),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
