//! Event stream configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis Streams configuration for provider events
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream carrying payment outcomes
    #[serde(default = "default_payment_stream")]
    pub payment_stream: String,

    /// Stream carrying refund outcomes
    #[serde(default = "default_refund_stream")]
    pub refund_stream: String,

    /// Consumer group shared by all service instances
    #[serde(default = "default_group")]
    pub group: String,

    /// This instance's consumer name within the group
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// How long one read blocks waiting for entries, in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Maximum entries fetched per read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How often unacknowledged entries are re-read, in seconds
    #[serde(default = "default_redelivery_interval")]
    pub redelivery_interval_secs: u64,
}

impl StreamConfig {
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn redelivery_interval(&self) -> Duration {
        Duration::from_secs(self.redelivery_interval_secs)
    }

    /// Validate stream configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.redis_url.is_empty() {
            return Err(ValidationError::MissingRequired(
                "SUBSCRIPTION_SERVICE__STREAM__REDIS_URL",
            ));
        }
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.payment_stream == self.refund_stream {
            return Err(ValidationError::StreamKeysNotDistinct);
        }
        if self.group.is_empty() {
            return Err(ValidationError::MissingRequired("SUBSCRIPTION_SERVICE__STREAM__GROUP"));
        }
        if self.consumer.is_empty() {
            return Err(ValidationError::MissingRequired(
                "SUBSCRIPTION_SERVICE__STREAM__CONSUMER",
            ));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.redelivery_interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout("stream.redelivery_interval_secs"));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            redis_url: String::new(),
            payment_stream: default_payment_stream(),
            refund_stream: default_refund_stream(),
            group: default_group(),
            consumer: default_consumer(),
            block_ms: default_block_ms(),
            batch_size: default_batch_size(),
            redelivery_interval_secs: default_redelivery_interval(),
        }
    }
}

fn default_payment_stream() -> String {
    "billing.payments".to_string()
}

fn default_refund_stream() -> String {
    "billing.refunds".to_string()
}

fn default_group() -> String {
    "subscription-service".to_string()
}

fn default_consumer() -> String {
    "subscription-service-1".to_string()
}

fn default_block_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    10
}

fn default_redelivery_interval() -> u64 {
    30
}
