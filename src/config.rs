use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub event_buffer_size: usize,
    pub snapshot_queue_size: usize,
    pub notification_limit: usize,
    pub notification_refresh_secs: u64,
    pub fee_floor_ratio: f64,
    pub fee_ceiling_ratio: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            snapshot_queue_size: parse_or_default("SNAPSHOT_QUEUE_SIZE", 64)?,
            notification_limit: parse_or_default("NOTIFICATION_LIMIT", 20)?,
            notification_refresh_secs: parse_or_default("NOTIFICATION_REFRESH_SECS", 60)?,
            fee_floor_ratio: parse_or_default("FEE_FLOOR_RATIO", 0.5)?,
            fee_ceiling_ratio: parse_or_default("FEE_CEILING_RATIO", 2.0)?,
        })
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

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        let config = Config::from_env().expect("config");
        assert_eq!(config.notification_limit, 20);
        assert_eq!(config.fee_floor_ratio, 0.5);
        assert_eq!(config.fee_ceiling_ratio, 2.0);
    }
}
