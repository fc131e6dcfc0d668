//! IdempotentHandler - Wrapper for ensuring exactly-once event effects.
//!
//! This adapter wraps any `EventApplier` and uses the processed-event
//! ledger so each provider event changes state at most once, no matter how
//! often the stream redelivers it.
//!
//! ## Usage
//!
//! ```ignore
//! let handler = IdempotentHandler::new(
//!     PaymentEventApplier::new(service.clone()),
//!     store.clone(),
//! );
//! ```
//!
//! ## How It Works
//!
//! 1. Read the subscription id from the event. Missing: discard.
//! 2. Open a unit of work and check the ledger. Present: duplicate.
//! 3. Delegate to the inner applier inside the same unit of work
//! 4. Record the event id and commit
//!
//! The state change and the ledger record commit together, so there is
//! no window where one is visible without the other.
//!
//! ## Error Handling
//!
//! - If the applier fails, the unit of work is dropped and nothing is
//!   recorded. The next delivery retries.
//! - If two deliveries race, the loser's `record` or commit fails on the
//!   ledger key and rolls back.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::subscription::{ProcessedEvent, ProviderEvent, SubscriptionError};
use crate::ports::{
    EventApplier, EventHandler, HandleOutcome, ProcessedEventLedger, SubscriptionStore,
};

/// Wrapper that ensures exactly-once event effects.
///
/// Decorates any `EventApplier` with ledger tracking. The ledger is keyed
/// by event id only; payment and refund events never share ids.
pub struct IdempotentHandler<A: EventApplier> {
    inner: A,
    store: Arc<dyn SubscriptionStore>,
}

impl<A: EventApplier> IdempotentHandler<A> {
    /// Create a new IdempotentHandler wrapping the given applier.
    pub fn new(inner: A, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<A: EventApplier + 'static> EventHandler for IdempotentHandler<A> {
    async fn handle(&self, event: &ProviderEvent) -> Result<HandleOutcome, SubscriptionError> {
        let handler = self.inner.name();

        let Some(subscription_id) = event.subscription_id() else {
            tracing::warn!(
                event_id = %event.id,
                handler,
                "Event has no subscription_id, discarding"
            );
            return Ok(HandleOutcome::Discarded);
        };

        let mut uow = self.store.begin().await?;

        if uow.contains(&event.id).await? {
            tracing::debug!(event_id = %event.id, handler, "Skipping duplicate event");
            return Ok(HandleOutcome::Duplicate);
        }

        self.inner
            .apply(uow.as_mut(), subscription_id, event)
            .await?;

        uow.record(&ProcessedEvent::now(event.id)).await?;
        uow.commit().await?;

        tracing::debug!(
            event_id = %event.id,
            %subscription_id,
            handler,
            "Event applied"
        );
        Ok(HandleOutcome::Applied)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
