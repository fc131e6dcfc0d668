//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SUBSCRIPTION_SERVICE` prefix and nested values use `__` as separator.
//!
//! # Example
//!
//! ```no_run
//! use subscription_service::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod server;
mod stream;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};
pub use stream::StreamConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Subscription store (PostgreSQL)
    pub database: DatabaseConfig,

    /// Provider event stream (Redis Streams)
    pub stream: StreamConfig,

    /// Billing provider HTTP API
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SUBSCRIPTION_SERVICE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SUBSCRIPTION_SERVICE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SUBSCRIPTION_SERVICE__STREAM__REDIS_URL=...` -> `stream.redis_url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_SERVICE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.stream.validate()?;
        self.billing.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SUBSCRIPTION_SERVICE__DATABASE__URL",
        "SUBSCRIPTION_SERVICE__STREAM__REDIS_URL",
        "SUBSCRIPTION_SERVICE__STREAM__BATCH_SIZE",
        "SUBSCRIPTION_SERVICE__BILLING__BASE_URL",
        "SUBSCRIPTION_SERVICE__BILLING__REQUEST_TIMEOUT_SECS",
        "SUBSCRIPTION_SERVICE__SERVER__PORT",
        "SUBSCRIPTION_SERVICE__SERVER__ENVIRONMENT",
    ];

    fn set_minimal_env() {
        env::set_var(
            "SUBSCRIPTION_SERVICE__DATABASE__URL",
            "postgresql://test@localhost/subscriptions",
        );
        env::set_var("SUBSCRIPTION_SERVICE__STREAM__REDIS_URL", "redis://localhost:6379");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        set_minimal_env();
        for (key, value) in extra {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/subscriptions");
        assert_eq!(config.stream.redis_url, "redis://localhost:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.stream.group, "subscription-service");
        assert_eq!(config.billing.request_timeout_secs, 10);
    }

    #[test]
    fn test_overrides() {
        let config = load_with(&[
            ("SUBSCRIPTION_SERVICE__SERVER__PORT", "3000"),
            ("SUBSCRIPTION_SERVICE__STREAM__BATCH_SIZE", "50"),
            ("SUBSCRIPTION_SERVICE__BILLING__BASE_URL", "https://billing.example.com"),
            ("SUBSCRIPTION_SERVICE__BILLING__REQUEST_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.stream.batch_size, 50);
        assert_eq!(config.billing.base_url, "https://billing.example.com");
        assert_eq!(config.billing.request_timeout_secs, 3);
    }

    #[test]
    fn test_is_production() {
        let config = load_with(&[("SUBSCRIPTION_SERVICE__SERVER__ENVIRONMENT", "production")])
            .unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let config = load_with(&[("SUBSCRIPTION_SERVICE__BILLING__BASE_URL", "billing:8000")])
            .unwrap();
        assert_eq!(config.validate(), Err(ValidationError::InvalidBillingUrl));
    }
}
