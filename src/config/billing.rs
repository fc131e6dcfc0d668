//! Billing provider configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Billing provider HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Base URL of the billing API, without the `/api/v1` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Total timeout for one billing call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bearer token sent to the billing API, if it requires one
    #[serde(default)]
    pub api_token: Option<SecretString>,
}

impl BillingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired(
                "SUBSCRIPTION_SERVICE__BILLING__BASE_URL",
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBillingUrl);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout("billing.request_timeout_secs"));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            api_token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://bill-api-nginx:8000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
