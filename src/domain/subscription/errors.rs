//! Subscription-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | PlanUnavailable | 404 |
//! | PlanNotFound | 404 |
//! | InvalidTransition | 409 |
//! | PaymentIncomplete | 409 |
//! | ValidationFailed | 400 |
//! | MalformedEvent | 400 |
//! | GatewayRejected | 502 |
//! | GatewayUnavailable | 503 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PlanId, SubscriptionId};

/// Errors raised by subscription lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Subscription is missing or owned by another user.
    #[error("Subscription not found: {0}")]
    NotFound(SubscriptionId),

    /// Plan is missing or no longer accepts subscriptions.
    #[error("Plan not available: {0}")]
    PlanUnavailable(PlanId),

    /// Plan referenced by an existing subscription is missing.
    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    /// Operation is not allowed from the current status.
    #[error("Cannot {attempted} subscription in {current} state")]
    InvalidTransition { current: String, attempted: String },

    /// Refund requested before any payment completed.
    #[error("Payment not completed for subscription {0}")]
    PaymentIncomplete(SubscriptionId),

    /// Billing provider could not be reached in time.
    #[error("Billing provider unavailable: {0}")]
    GatewayUnavailable(String),

    /// Billing provider answered with a non-success status.
    #[error("Billing provider rejected request with status {status}: {message}")]
    GatewayRejected { status: u16, message: String },

    /// Inbound event failed schema validation.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    /// Storage or transport failure.
    #[error("Error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn not_found(id: SubscriptionId) -> Self {
        SubscriptionError::NotFound(id)
    }

    pub fn plan_unavailable(id: PlanId) -> Self {
        SubscriptionError::PlanUnavailable(id)
    }

    pub fn invalid_transition(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        SubscriptionError::InvalidTransition {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn malformed_event(reason: impl Into<String>) -> Self {
        SubscriptionError::MalformedEvent(reason.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::PlanUnavailable(_) => ErrorCode::PlanUnavailable,
            SubscriptionError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            SubscriptionError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::PaymentIncomplete(_) => ErrorCode::PaymentIncomplete,
            SubscriptionError::GatewayUnavailable(_) => ErrorCode::GatewayUnavailable,
            SubscriptionError::GatewayRejected { .. } => ErrorCode::GatewayRejected,
            SubscriptionError::MalformedEvent(_) => ErrorCode::MalformedEvent,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// Precondition failures are the caller's to fix; provider outages and
    /// storage failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::GatewayUnavailable(_) | SubscriptionError::Infrastructure(_)
        )
    }

    /// Folds an aggregate or port error into a subscription error.
    ///
    /// `id` names the subscription the failing operation targeted.
    pub fn from_domain(id: SubscriptionId, err: DomainError) -> Self {
        match err.code {
            ErrorCode::InvalidStateTransition => SubscriptionError::InvalidTransition {
                current: err.details.get("current").cloned().unwrap_or_default(),
                attempted: err.details.get("attempted").cloned().unwrap_or_default(),
            },
            ErrorCode::PaymentIncomplete => SubscriptionError::PaymentIncomplete(id),
            ErrorCode::SubscriptionNotFound => SubscriptionError::NotFound(id),
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => SubscriptionError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}
