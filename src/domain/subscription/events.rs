//! Inbound billing provider events.
//!
//! Both topics carry the same shape:
//!
//! ```json
//! {
//!   "id": "6f1c...",
//!   "status": "succeeded",
//!   "external_cancellation_reason": null,
//!   "extra_data": { "subscription_id": "9b0e...", "plan_id": "..." }
//! }
//! ```
//!
//! Unknown fields are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::{EventId, SubscriptionId};

use super::SubscriptionError;

/// Stream an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Payment,
    Refund,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::Payment => "payment",
            EventTopic::Refund => "refund",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Succeeded,
    Cancelled,
}

/// A payment or refund outcome emitted by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: EventId,
    pub status: EventOutcome,
    #[serde(default)]
    pub external_cancellation_reason: Option<String>,
    #[serde(default)]
    pub extra_data: Option<Map<String, Value>>,
}

impl ProviderEvent {
    /// Parses a raw stream payload.
    ///
    /// # Errors
    ///
    /// `MalformedEvent` if the payload is not JSON or misses `id`/`status`.
    pub fn from_slice(payload: &[u8]) -> Result<Self, SubscriptionError> {
        serde_json::from_slice(payload)
            .map_err(|e| SubscriptionError::malformed_event(e.to_string()))
    }

    pub fn succeeded(&self) -> bool {
        self.status == EventOutcome::Succeeded
    }

    /// Subscription this event refers to, read from `extra_data`.
    ///
    /// `None` when the key is absent, not a string, or not a UUID.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.extra_data
            .as_ref()?
            .get("subscription_id")?
            .as_str()?
            .parse()
            .ok()
    }
}
