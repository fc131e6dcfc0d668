//! SubscriptionService - The subscription lifecycle.
//!
//! Each public operation opens one unit of work, checks preconditions,
//! mutates the subscription, calls the billing gateway where needed, and
//! commits. Any error drops the unit of work and rolls everything back.
//!
//! The `*_in` variants run inside a unit of work owned by the caller.
//! Event handlers use them so the transition and the ledger record
//! commit together.

use std::sync::Arc;

use crate::domain::foundation::{PaymentId, PlanId, SubscriptionId, UserId};
use crate::domain::subscription::{Plan, Subscription, SubscriptionError, Transition};
use crate::ports::{
    BillingGateway, PaymentRequest, PlanCatalog, RefundRequest, SubscriptionRepository,
    SubscriptionStore, UnitOfWork,
};

/// Command to subscribe a user to a plan.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    /// Where the provider sends the user after checkout.
    pub return_url: String,
}

/// Command to cancel an active subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
}

/// Command to ask the provider for a refund.
#[derive(Debug, Clone)]
pub struct RequestRefundCommand {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    /// Where the provider reports the refund outcome.
    pub handler_url: String,
}

/// The subscription state machine.
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn BillingGateway>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn BillingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Create a `PENDING_PAYMENT` subscription and ask the provider to
    /// start the payment.
    ///
    /// The row is inserted before the gateway call and committed after it,
    /// so a gateway failure leaves nothing behind.
    ///
    /// # Errors
    ///
    /// - `PlanUnavailable` if the plan is missing or inactive
    /// - `GatewayUnavailable` / `GatewayRejected` if the provider call fails
    pub async fn create_subscription(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let mut uow = self.store.begin().await?;

        let plan = uow
            .find_plan(&cmd.plan_id)
            .await?
            .filter(Plan::is_active)
            .ok_or_else(|| {
                tracing::warn!(
                    plan_id = %cmd.plan_id,
                    user_id = %cmd.user_id,
                    "Attempted to subscribe to unavailable plan"
                );
                SubscriptionError::plan_unavailable(cmd.plan_id)
            })?;

        let subscription = Subscription::create_pending(cmd.user_id, plan.id);
        uow.insert(&subscription).await?;

        let request = PaymentRequest::for_subscription(
            cmd.user_id,
            subscription.id,
            plan.id,
            plan.amount,
            plan.currency.clone(),
            cmd.return_url,
        );
        if let Err(e) = self.gateway.request_payment(request).await {
            tracing::error!(
                subscription_id = %subscription.id,
                user_id = %cmd.user_id,
                plan_id = %plan.id,
                error = %e,
                "Failed to request payment, rolling back subscription"
            );
            return Err(e.into());
        }

        uow.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %cmd.user_id,
            plan_id = %plan.id,
            amount = %plan.amount,
            currency = %plan.currency,
            status = %subscription.status,
            "Created subscription"
        );
        Ok(subscription)
    }

    /// Activate a subscription after its payment succeeded.
    ///
    /// Idempotent: returns `Ok(false)` without changes if the subscription
    /// is missing or no longer `PENDING_PAYMENT`.
    pub async fn activate_from_payment(
        &self,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<bool, SubscriptionError> {
        let mut uow = self.store.begin().await?;
        let activated = self
            .activate_from_payment_in(uow.as_mut(), subscription_id, payment_id)
            .await?;
        uow.commit().await?;
        Ok(activated)
    }

    /// [`activate_from_payment`](Self::activate_from_payment) inside the
    /// caller's unit of work. The caller commits.
    pub async fn activate_from_payment_in(
        &self,
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
        payment_id: PaymentId,
    ) -> Result<bool, SubscriptionError> {
        let Some(mut subscription) = uow.find_for_update(&subscription_id).await? else {
            tracing::warn!(%subscription_id, %payment_id, "Subscription not found for activation");
            return Ok(false);
        };

        if !subscription.can(Transition::Activate) {
            tracing::info!(
                %subscription_id,
                %payment_id,
                status = %subscription.status,
                "Subscription activation skipped"
            );
            return Ok(false);
        }

        subscription
            .activate(payment_id)
            .map_err(|e| SubscriptionError::from_domain(subscription_id, e))?;
        uow.update(&subscription).await?;

        tracing::info!(
            %subscription_id,
            %payment_id,
            user_id = %subscription.user_id,
            status = %subscription.status,
            "Activated subscription from payment"
        );
        Ok(true)
    }

    /// Cancel the user's active subscription.
    ///
    /// # Errors
    ///
    /// - `NotFound` if missing or owned by someone else
    /// - `InvalidTransition` unless `ACTIVE`
    pub async fn cancel(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let mut uow = self.store.begin().await?;
        let mut subscription =
            Self::find_owned(uow.as_mut(), cmd.subscription_id, cmd.user_id, "cancel").await?;

        subscription.cancel().map_err(|e| {
            tracing::warn!(
                subscription_id = %cmd.subscription_id,
                status = %subscription.status,
                "Cancel rejected"
            );
            SubscriptionError::from_domain(cmd.subscription_id, e)
        })?;
        uow.update(&subscription).await?;
        uow.commit().await?;

        tracing::info!(
            subscription_id = %cmd.subscription_id,
            user_id = %cmd.user_id,
            status = %subscription.status,
            "Cancelled subscription"
        );
        Ok(subscription)
    }

    /// Ask the provider to refund the subscription's payment.
    ///
    /// Status only moves to `REFUND_REQUESTED` after the provider accepted
    /// the request.
    ///
    /// # Errors
    ///
    /// - `NotFound` if missing or owned by someone else
    /// - `InvalidTransition` unless `ACTIVE` or `CANCELLED`
    /// - `PaymentIncomplete` if no payment was recorded
    /// - `PlanNotFound` if the subscription's plan is gone
    /// - `GatewayUnavailable` / `GatewayRejected` if the provider call fails
    pub async fn request_refund(
        &self,
        cmd: RequestRefundCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let mut uow = self.store.begin().await?;
        let current =
            Self::find_owned(uow.as_mut(), cmd.subscription_id, cmd.user_id, "refund").await?;

        let mut refunding = current.clone();
        refunding.request_refund().map_err(|e| {
            tracing::warn!(
                subscription_id = %cmd.subscription_id,
                status = %current.status,
                has_payment = current.payment_id.is_some(),
                "Refund not allowed"
            );
            SubscriptionError::from_domain(cmd.subscription_id, e)
        })?;
        let payment_id = refunding
            .payment_id
            .ok_or(SubscriptionError::PaymentIncomplete(cmd.subscription_id))?;

        let plan = uow.find_plan(&current.plan_id).await?.ok_or_else(|| {
            tracing::error!(
                subscription_id = %cmd.subscription_id,
                plan_id = %current.plan_id,
                "Refund failed: plan not found"
            );
            SubscriptionError::PlanNotFound(current.plan_id)
        })?;

        let request = RefundRequest::for_subscription(
            cmd.subscription_id,
            plan.amount,
            plan.currency.clone(),
            cmd.handler_url,
        );
        if let Err(e) = self.gateway.request_refund(payment_id, request).await {
            tracing::error!(
                subscription_id = %cmd.subscription_id,
                %payment_id,
                error = %e,
                "Failed to request refund"
            );
            return Err(e.into());
        }

        uow.update(&refunding).await?;
        uow.commit().await?;

        tracing::info!(
            subscription_id = %cmd.subscription_id,
            %payment_id,
            amount = %plan.amount,
            currency = %plan.currency,
            status = %refunding.status,
            "Refund requested"
        );
        Ok(refunding)
    }

    /// Mark a refund complete inside the caller's unit of work.
    ///
    /// Returns `Ok(false)` without changes unless the subscription is
    /// `REFUND_REQUESTED` with a payment id.
    pub async fn complete_refund_in(
        &self,
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
    ) -> Result<bool, SubscriptionError> {
        let Some(mut subscription) = uow.find_for_update(&subscription_id).await? else {
            tracing::warn!(%subscription_id, "Subscription not found for refund completion");
            return Ok(false);
        };

        if !subscription.can(Transition::CompleteRefund) {
            if subscription.status.permits(Transition::CompleteRefund) {
                tracing::error!(
                    %subscription_id,
                    "Refund completion skipped: subscription has no payment id"
                );
            } else {
                tracing::info!(
                    %subscription_id,
                    status = %subscription.status,
                    "Refund completion skipped"
                );
            }
            return Ok(false);
        }

        subscription
            .complete_refund()
            .map_err(|e| SubscriptionError::from_domain(subscription_id, e))?;
        uow.update(&subscription).await?;

        tracing::info!(
            %subscription_id,
            user_id = %subscription.user_id,
            status = %subscription.status,
            "Refunded subscription"
        );
        Ok(true)
    }

    /// All of a user's subscriptions, newest first.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let mut uow = self.store.begin().await?;
        let subscriptions = uow.list_by_user(&user_id).await?;
        uow.commit().await?;
        Ok(subscriptions)
    }

    async fn find_owned(
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
        user_id: UserId,
        operation: &'static str,
    ) -> Result<Subscription, SubscriptionError> {
        match uow.find_for_update(&subscription_id).await? {
            Some(subscription) if subscription.is_owned_by(&user_id) => Ok(subscription),
            _ => {
                tracing::warn!(
                    %subscription_id,
                    %user_id,
                    operation,
                    "Subscription not found for user"
                );
                Err(SubscriptionError::not_found(subscription_id))
            }
        }
    }
}
