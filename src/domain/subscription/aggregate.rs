//! Subscription aggregate entity.
//!
//! # Invariants
//!
//! - A new subscription is `PENDING_PAYMENT` with no payment id
//! - Activation is the only place the payment id is set
//! - `REFUND_REQUESTED` and `REFUNDED` always carry a payment id

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, PlanId, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{SubscriptionStatus, Transition};

/// A user's subscription to one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    /// Provider payment that activated this subscription.
    pub payment_id: Option<PaymentId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates a subscription awaiting its first payment.
    pub fn create_pending(user_id: UserId, plan_id: PlanId) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            user_id,
            plan_id,
            status: SubscriptionStatus::PendingPayment,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Returns true if `transition` is currently allowed, payment-id
    /// requirements included.
    pub fn can(&self, transition: Transition) -> bool {
        if !self.status.permits(transition) {
            return false;
        }
        match transition {
            Transition::RequestRefund | Transition::CompleteRefund => self.payment_id.is_some(),
            Transition::Activate | Transition::Cancel => true,
        }
    }

    /// Marks the subscription paid.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the subscription is `PENDING_PAYMENT`.
    pub fn activate(&mut self, payment_id: PaymentId) -> Result<(), DomainError> {
        self.apply(Transition::Activate)?;
        self.payment_id = Some(payment_id);
        Ok(())
    }

    /// Cancels an active subscription.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.apply(Transition::Cancel)
    }

    /// Records that the provider accepted a refund request.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless `ACTIVE` or `CANCELLED`;
    /// `PaymentIncomplete` if the subscription was never paid.
    pub fn request_refund(&mut self) -> Result<(), DomainError> {
        self.require_payment(Transition::RequestRefund)?;
        self.apply(Transition::RequestRefund)
    }

    /// Records the provider's confirmation that the refund went through.
    pub fn complete_refund(&mut self) -> Result<(), DomainError> {
        self.require_payment(Transition::CompleteRefund)?;
        self.apply(Transition::CompleteRefund)
    }

    fn require_payment(&self, transition: Transition) -> Result<(), DomainError> {
        if self.status.permits(transition) && self.payment_id.is_none() {
            return Err(DomainError::new(
                ErrorCode::PaymentIncomplete,
                format!("Subscription {} has no completed payment", self.id),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, transition: Transition) -> Result<(), DomainError> {
        if !self.status.permits(transition) {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot {} subscription in {} state",
                    transition, self.status
                ),
            )
            .with_detail("current", self.status.as_str())
            .with_detail("attempted", transition.as_str()));
        }
        self.status = transition.target();
        self.updated_at = Timestamp::now();
        Ok(())
    }
}
