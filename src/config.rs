use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::sync::SyncPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Discourse API
    pub api_key: String,
    pub api_username: String,
    pub http_timeout: Duration,

    // Sync Policy
    pub use_discourse_comments: bool,
    pub webhook_mode: bool,
    pub sync_period: Duration,
    pub listing_sync_period: Duration,
    pub poll_interval: Duration,
    pub lock_stale_after: Duration,

    // Comment Filters
    pub max_comments: u32,
    pub min_trust_level: u32,
    pub min_score: i64,
    pub min_replies: u32,
    pub bypass_trust_level_score: i64,
    pub only_show_moderator_liked: bool,
    pub show_existing_comments: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/comments.sqlite",
            )),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,

            // Discourse API
            api_key: required_env("DISCOURSE_API_KEY")?,
            api_username: env_or_default("DISCOURSE_API_USERNAME", "system"),
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Sync Policy
            use_discourse_comments: parse_env_bool("USE_DISCOURSE_COMMENTS", true)?,
            webhook_mode: parse_env_bool("USE_DISCOURSE_WEBHOOK", false)?,
            sync_period: Duration::from_secs(parse_env_u64("SYNC_PERIOD_SECS", 600)?),
            listing_sync_period: Duration::from_secs(parse_env_u64(
                "LISTING_SYNC_PERIOD_SECS",
                86_400,
            )?),
            poll_interval: Duration::from_secs(parse_env_u64("POLL_INTERVAL_SECS", 60)?),
            lock_stale_after: Duration::from_secs(parse_env_u64("LOCK_STALE_AFTER_SECS", 300)?),

            // Comment Filters
            max_comments: parse_env_u32("MAX_COMMENTS", 5)?,
            min_trust_level: parse_env_u32("MIN_TRUST_LEVEL", 1)?,
            min_score: parse_env_i64("MIN_SCORE", 0)?,
            min_replies: parse_env_u32("MIN_REPLIES", 1)?,
            bypass_trust_level_score: parse_env_i64("BYPASS_TRUST_LEVEL_SCORE", 50)?,
            only_show_moderator_liked: parse_env_bool("ONLY_SHOW_MODERATOR_LIKED", false)?,
            show_existing_comments: parse_env_bool("SHOW_EXISTING_COMMENTS", false)?,
        })
    }

    /// Configuration with defaults suitable for tests. No environment access.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            api_key: "test-key".to_string(),
            api_username: "system".to_string(),
            http_timeout: Duration::from_secs(5),
            use_discourse_comments: true,
            webhook_mode: false,
            sync_period: Duration::from_secs(600),
            listing_sync_period: Duration::from_secs(86_400),
            poll_interval: Duration::from_secs(60),
            lock_stale_after: Duration::from_secs(300),
            max_comments: 5,
            min_trust_level: 1,
            min_score: 0,
            min_replies: 1,
            bypass_trust_level_score: 50,
            only_show_moderator_liked: false,
            show_existing_comments: false,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DISCOURSE_API_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.sync_period.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SYNC_PERIOD_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.listing_sync_period.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "LISTING_SYNC_PERIOD_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.lock_stale_after.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "LOCK_STALE_AFTER_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The sync policy derived from this configuration.
    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        SyncPolicy {
            use_remote_comments: self.use_discourse_comments,
            webhook_mode: self.webhook_mode,
            sync_period_seconds: self.sync_period.as_secs(),
            listing_sync_period_seconds: self.listing_sync_period.as_secs(),
            max_comments: self.max_comments,
            min_trust_level: self.min_trust_level,
            min_score: self.min_score,
            min_replies: self.min_replies,
            bypass_trust_level_score: self.bypass_trust_level_score,
            only_show_moderator_liked: self.only_show_moderator_liked,
            api_key: self.api_key.clone(),
            api_username: self.api_username.clone(),
            show_existing_comments: self.show_existing_comments,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    #[serial]
    fn test_parse_bool_rejects_garbage() {
        std::env::set_var("DCS_TEST_BOOL", "maybe");
        let result = parse_env_bool("DCS_TEST_BOOL", false);
        std::env::remove_var("DCS_TEST_BOOL");
        assert!(matches!(result, Err(ConfigError::ParseBool { .. })));
    }

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        std::env::remove_var("DISCOURSE_API_KEY");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "DISCOURSE_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::set_var("DISCOURSE_API_KEY", "abc123");
        let config = Config::from_env().unwrap();
        std::env::remove_var("DISCOURSE_API_KEY");

        assert_eq!(config.sync_period, Duration::from_secs(600));
        assert_eq!(config.listing_sync_period, Duration::from_secs(86_400));
        assert_eq!(config.api_username, "system");
        assert!(!config.webhook_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let config = Config {
            sync_period: Duration::ZERO,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_mirrors_config() {
        let config = Config {
            webhook_mode: true,
            max_comments: 9,
            ..Config::for_testing()
        };
        let policy = config.policy();
        assert!(policy.webhook_mode);
        assert_eq!(policy.max_comments, 9);
        assert_eq!(policy.sync_period_seconds, 600);
        assert_eq!(policy.api_key, "test-key");
    }
}
