use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub auth_clock_skew: Duration,
    pub sync_max_batch_notes: usize,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub list_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("sync_max_batch_notes", &self.sync_max_batch_notes)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field(
                "list_rate_limit_per_window",
                &self.list_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "NOTELY_API_BIND_ADDR", "127.0.0.1:3000");
        let database_path = PathBuf::from(value_or_default(
            &lookup,
            "NOTELY_DATABASE_PATH",
            "notely-server.db",
        ));

        let jwt_secret = required_trimmed(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }

        let auth_clock_skew_secs = value_or_default(&lookup, "AUTH_CLOCK_SKEW_SECS", "60")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "AUTH_CLOCK_SKEW_SECS must be an integer in [0, 300]".to_string(),
                )
            })?;
        if auth_clock_skew_secs > 300 {
            return Err(ConfigError::Invalid(
                "AUTH_CLOCK_SKEW_SECS must be in [0, 300]".to_string(),
            ));
        }

        let sync_max_batch_notes = value_or_default(&lookup, "SYNC_MAX_BATCH_NOTES", "1000")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "SYNC_MAX_BATCH_NOTES must be an integer in [1, 10000]".to_string(),
                )
            })?;
        if !(1..=10_000).contains(&sync_max_batch_notes) {
            return Err(ConfigError::Invalid(
                "SYNC_MAX_BATCH_NOTES must be in [1, 10000]".to_string(),
            ));
        }

        let rate_limit_window_secs = value_or_default(&lookup, "RATE_LIMIT_WINDOW_SECS", "60")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "RATE_LIMIT_WINDOW_SECS must be an integer in [10, 3600]".to_string(),
                )
            })?;
        if !(10..=3_600).contains(&rate_limit_window_secs) {
            return Err(ConfigError::Invalid(
                "RATE_LIMIT_WINDOW_SECS must be in [10, 3600]".to_string(),
            ));
        }

        let sync_rate_limit_per_window =
            value_or_default(&lookup, "SYNC_RATE_LIMIT_PER_WINDOW", "60")
                .parse::<u32>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "SYNC_RATE_LIMIT_PER_WINDOW must be an integer in [1, 1000]".to_string(),
                    )
                })?;
        if !(1..=1_000).contains(&sync_rate_limit_per_window) {
            return Err(ConfigError::Invalid(
                "SYNC_RATE_LIMIT_PER_WINDOW must be in [1, 1000]".to_string(),
            ));
        }

        let list_rate_limit_per_window =
            value_or_default(&lookup, "LIST_RATE_LIMIT_PER_WINDOW", "120")
                .parse::<u32>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "LIST_RATE_LIMIT_PER_WINDOW must be an integer in [1, 5000]".to_string(),
                    )
                })?;
        if !(1..=5_000).contains(&list_rate_limit_per_window) {
            return Err(ConfigError::Invalid(
                "LIST_RATE_LIMIT_PER_WINDOW must be in [1, 5000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            sync_max_batch_notes,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window,
            list_rate_limit_per_window,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "sensitive-signing-secret";

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let map: HashMap<&str, &str> = HashMap::new();
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn config_applies_defaults() {
        let map = HashMap::from([("JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.database_path, PathBuf::from("notely-server.db"));
        assert_eq!(config.auth_clock_skew, Duration::from_secs(60));
        assert_eq!(config.sync_max_batch_notes, 1000);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.sync_rate_limit_per_window, 60);
        assert_eq!(config.list_rate_limit_per_window, 120);
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let map = HashMap::from([("JWT_SECRET", SECRET), ("SYNC_MAX_BATCH_NOTES", "0")]);
        assert!(config_from(&map)
            .unwrap_err()
            .to_string()
            .contains("SYNC_MAX_BATCH_NOTES"));

        let map = HashMap::from([("JWT_SECRET", SECRET), ("AUTH_CLOCK_SKEW_SECS", "301")]);
        assert!(config_from(&map).is_err());

        let map = HashMap::from([("JWT_SECRET", SECRET), ("RATE_LIMIT_WINDOW_SECS", "soon")]);
        assert!(config_from(&map).is_err());

        let map = HashMap::from([("JWT_SECRET", "short")]);
        assert!(config_from(&map).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let map = HashMap::from([("JWT_SECRET", SECRET), ("NOTELY_API_BIND_ADDR", "0.0.0.0:8080")]);
        let config = config_from(&map).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("0.0.0.0:8080"));
    }
}
