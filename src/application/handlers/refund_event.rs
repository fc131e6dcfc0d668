//! RefundEventApplier - Applies refund outcome events to subscriptions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::SubscriptionService;
use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::{ProviderEvent, SubscriptionError};
use crate::ports::{EventApplier, UnitOfWork};

/// Moves a `REFUND_REQUESTED` subscription to `REFUNDED` when the provider
/// confirms the refund.
///
/// A cancelled refund keeps the subscription in `REFUND_REQUESTED`; there
/// is no transition back.
pub struct RefundEventApplier {
    service: Arc<SubscriptionService>,
}

impl RefundEventApplier {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventApplier for RefundEventApplier {
    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
        event: &ProviderEvent,
    ) -> Result<(), SubscriptionError> {
        if !event.succeeded() {
            tracing::warn!(
                event_id = %event.id,
                %subscription_id,
                reason = event.external_cancellation_reason.as_deref().unwrap_or("unknown"),
                "Refund cancelled by provider"
            );
            return Ok(());
        }

        self.service.complete_refund_in(uow, subscription_id).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RefundEventApplier"
    }
}
