//! Subscription status state machine.
//!
//! ```text
//! PENDING_PAYMENT -> ACTIVE -> CANCELLED -> REFUND_REQUESTED -> REFUNDED
//!                      \_____________________^
//! ```

use std::fmt;

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Created locally, waiting for the provider to confirm payment.
    PendingPayment,

    /// Paid. Carries the payment id that activated it.
    Active,

    /// Cancelled by the owner. Still refundable.
    Cancelled,

    /// Refund accepted by the provider, completion pending.
    RefundRequested,

    /// Money returned. Terminal.
    Refunded,
}

/// A named lifecycle operation on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Activate,
    Cancel,
    RequestRefund,
    CompleteRefund,
}

impl Transition {
    pub const ALL: [Transition; 4] = [
        Transition::Activate,
        Transition::Cancel,
        Transition::RequestRefund,
        Transition::CompleteRefund,
    ];

    /// Status a subscription lands in after this transition.
    pub fn target(&self) -> SubscriptionStatus {
        match self {
            Transition::Activate => SubscriptionStatus::Active,
            Transition::Cancel => SubscriptionStatus::Cancelled,
            Transition::RequestRefund => SubscriptionStatus::RefundRequested,
            Transition::CompleteRefund => SubscriptionStatus::Refunded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Activate => "activate",
            Transition::Cancel => "cancel",
            Transition::RequestRefund => "request refund for",
            Transition::CompleteRefund => "complete refund for",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 5] = [
        SubscriptionStatus::PendingPayment,
        SubscriptionStatus::Active,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::RefundRequested,
        SubscriptionStatus::Refunded,
    ];

    /// Returns true if `transition` may be applied to a subscription in this status.
    ///
    /// Status-only rule. The payment-id requirements of the refund
    /// transitions are enforced by the aggregate.
    pub fn permits(&self, transition: Transition) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, transition),
            (PendingPayment, Transition::Activate)
                | (Active, Transition::Cancel)
                | (Active, Transition::RequestRefund)
                | (Cancelled, Transition::RequestRefund)
                | (RefundRequested, Transition::CompleteRefund)
        )
    }

    /// Wire and storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "PENDING_PAYMENT",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::RefundRequested => "REFUND_REQUESTED",
            SubscriptionStatus::Refunded => "REFUNDED",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        Transition::ALL
            .iter()
            .any(|t| t.target() == *target && self.permits(*t))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        Transition::ALL
            .iter()
            .filter(|t| self.permits(**t))
            .map(|t| t.target())
            .collect()
    }
}
