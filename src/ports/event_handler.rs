//! EventHandler port - Processing of inbound provider events.

use async_trait::async_trait;

use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::{ProviderEvent, SubscriptionError};

use super::UnitOfWork;

/// What a handler did with an event.
///
/// Every outcome means the delivery may be acknowledged. Failures are
/// reported through `Err` and leave the delivery pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Event recorded in the ledger, state change (if any) committed.
    Applied,
    /// Ledger already had this event.
    Duplicate,
    /// Event cannot be attributed to a subscription and was dropped.
    Discarded,
}

/// Handler for a provider event.
///
/// Implementations must be idempotent: handling the same event twice
/// leaves state as if it were handled once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: &ProviderEvent) -> Result<HandleOutcome, SubscriptionError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// The state change an event causes, run inside a unit of work that the
/// caller opened and will commit.
///
/// Wrapped by `IdempotentHandler`, which owns the ledger check and commit.
#[async_trait]
pub trait EventApplier: Send + Sync {
    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        subscription_id: SubscriptionId,
        event: &ProviderEvent,
    ) -> Result<(), SubscriptionError>;

    fn name(&self) -> &'static str;
}
