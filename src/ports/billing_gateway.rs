//! BillingGateway port - Outbound requests to the billing provider.
//!
//! Both calls only ask the provider to start work. A successful return
//! means "accepted"; the outcome arrives later on the event stream.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::foundation::{PaymentId, PlanId, SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionError;

/// Port for the billing provider's payment API.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Ask the provider to start a payment.
    async fn request_payment(&self, request: PaymentRequest) -> Result<(), GatewayError>;

    /// Ask the provider to refund an earlier payment.
    async fn request_refund(
        &self,
        payment_id: PaymentId,
        request: RefundRequest,
    ) -> Result<(), GatewayError>;
}

/// Body of a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub user_id: UserId,
    /// Serialized as a decimal string.
    pub amount: Decimal,
    pub currency: String,
    pub return_url: String,
    /// Echoed back in the provider's event.
    pub extra_data: BTreeMap<String, String>,
}

impl PaymentRequest {
    pub fn for_subscription(
        user_id: UserId,
        subscription_id: SubscriptionId,
        plan_id: PlanId,
        amount: Decimal,
        currency: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        let mut extra_data = BTreeMap::new();
        extra_data.insert("subscription_id".to_string(), subscription_id.to_string());
        extra_data.insert("plan_id".to_string(), plan_id.to_string());
        Self {
            user_id,
            amount,
            currency: currency.into(),
            return_url: return_url.into(),
            extra_data,
        }
    }
}

/// Body of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRequest {
    pub amount: Decimal,
    pub currency: String,
    pub extra_data: BTreeMap<String, String>,
    /// Where the provider should report the refund outcome.
    pub handler_url: String,
}

impl RefundRequest {
    pub fn for_subscription(
        subscription_id: SubscriptionId,
        amount: Decimal,
        currency: impl Into<String>,
        handler_url: impl Into<String>,
    ) -> Self {
        let mut extra_data = BTreeMap::new();
        extra_data.insert("subscription_id".to_string(), subscription_id.to_string());
        Self {
            amount,
            currency: currency.into(),
            extra_data,
            handler_url: handler_url.into(),
        }
    }
}

/// How a gateway call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Connection failure or timeout. Nothing is known about the outcome.
    Unavailable,
    /// The provider answered with a non-2xx status.
    Rejected,
}

/// Error returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// HTTP status for `Rejected`.
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Unavailable,
            message: message.into(),
            status: None,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Rejected,
            message: message.into(),
            status: Some(status),
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, self.status) {
            (GatewayErrorKind::Rejected, Some(status)) => {
                write!(f, "rejected ({}): {}", status, self.message)
            }
            _ => write!(f, "unavailable: {}", self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for SubscriptionError {
    fn from(err: GatewayError) -> Self {
        match err.kind {
            GatewayErrorKind::Unavailable => SubscriptionError::GatewayUnavailable(err.message),
            GatewayErrorKind::Rejected => SubscriptionError::GatewayRejected {
                status: err.status.unwrap_or_default(),
                message: err.message,
            },
        }
    }
}
