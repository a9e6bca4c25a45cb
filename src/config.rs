use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub active_ride_ttl: Duration,
    pub default_search_radius_km: f64,
    /// Zero disables the staleness sweep.
    pub availability_stale_after: Duration,
    pub availability_sweep_interval: Duration,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let default_search_radius_km: f64 = parse_or_default("DEFAULT_SEARCH_RADIUS_KM", 5.0)?;
        if !default_search_radius_km.is_finite() || default_search_radius_km < 0.0 {
            return Err(AppError::Internal(format!(
                "invalid DEFAULT_SEARCH_RADIUS_KM: {default_search_radius_km}"
            )));
        }

        let sweep_interval_secs: u64 = non_zero(
            "AVAILABILITY_SWEEP_INTERVAL_SECS",
            parse_or_default("AVAILABILITY_SWEEP_INTERVAL_SECS", 60)?,
        )?;
        let event_buffer_size: usize = non_zero(
            "EVENT_BUFFER_SIZE",
            parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        )?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size,
            active_ride_ttl: Duration::from_secs(parse_or_default(
                "ACTIVE_RIDE_TTL_SECS",
                24 * 60 * 60,
            )?),
            default_search_radius_km,
            availability_stale_after: Duration::from_secs(parse_or_default(
                "AVAILABILITY_STALE_SECS",
                0,
            )?),
            availability_sweep_interval: Duration::from_secs(sweep_interval_secs),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
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

fn non_zero<T>(key: &str, value: T) -> Result<T, AppError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        return Err(AppError::Internal(format!("invalid {key}: must be > 0")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::non_zero;
    use crate::error::AppError;

    #[test]
    fn zero_event_buffer_is_rejected() {
        let result = non_zero("EVENT_BUFFER_SIZE", 0usize);
        assert!(matches!(result, Err(AppError::Internal(msg)) if msg.contains("EVENT_BUFFER_SIZE")));
        assert_eq!(non_zero("EVENT_BUFFER_SIZE", 1usize).unwrap(), 1);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        assert!(non_zero("AVAILABILITY_SWEEP_INTERVAL_SECS", 0u64).is_err());
    }
}
