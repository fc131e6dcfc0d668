//! PaymentEventApplier - Applies payment outcome events to subscriptions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::SubscriptionService;
use crate::domain::foundation::{PaymentId, SubscriptionId};
use crate::domain::subscription::{ProviderEvent, SubscriptionError};
use crate::ports::{EventApplier, UnitOfWork};

/// Activates a `PENDING_PAYMENT` subscription when its payment succeeds.
///
/// The provider's event id doubles as the payment id. Cancelled payments
/// leave the subscription pending and are only logged.
pub struct PaymentEventApplier {
    service: Arc<SubscriptionService>,
}

impl PaymentEventApplier {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventApplier for PaymentEventApplier {
    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
        event: &ProviderEvent,
    ) -> Result<(), SubscriptionError> {
        if !event.succeeded() {
            tracing::info!(
                event_id = %event.id,
                %subscription_id,
                reason = event.external_cancellation_reason.as_deref().unwrap_or("unknown"),
                "Payment cancelled by provider"
            );
            return Ok(());
        }

        self.service
            .activate_from_payment_in(uow, subscription_id, PaymentId::from(event.id))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PaymentEventApplier"
    }
}
