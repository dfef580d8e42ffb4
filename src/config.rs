use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub max_drivers_to_notify: usize,
    pub driver_response_timeout_ms: u64,
    pub matching_radius_km: f64,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub base_fare: f64,
    pub per_km_rate: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_drivers_to_notify: parse_or_default("MAX_DRIVERS_TO_NOTIFY", 3)?,
            driver_response_timeout_ms: parse_or_default("DRIVER_RESPONSE_TIMEOUT_MS", 30_000)?,
            matching_radius_km: parse_or_default("MATCHING_RADIUS_KM", 5.0)?,
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            base_fare: parse_or_default("BASE_FARE", 2.50)?,
            per_km_rate: parse_or_default("PER_KM_RATE", 1.20)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_drivers_to_notify: 3,
            driver_response_timeout_ms: 30_000,
            matching_radius_km: 5.0,
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            base_fare: 2.50,
            per_km_rate: 1.20,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
