//! Request and response bodies for subscription endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, SubscriptionId};
use crate::domain::subscription::{Subscription, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /api/v1/subscriptions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: PlanId,
    /// Where the provider sends the user after checkout.
    pub return_url: String,
}

/// Body of `POST /api/v1/subscriptions/{id}/refund`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundSubscriptionRequest {
    /// Where the provider reports the refund outcome.
    pub handler_url: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

/// A subscription as seen by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            id: subscription.id,
            plan_id: subscription.plan_id,
            status: subscription.status,
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
