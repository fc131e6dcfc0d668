//! Unit of work port - One transaction across catalog, subscriptions and ledger.
//!
//! Every lifecycle operation and every event handler runs inside exactly
//! one unit of work. Dropping it without calling `commit` rolls back.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

use super::{PlanCatalog, ProcessedEventLedger, SubscriptionRepository};

/// A single open transaction.
#[async_trait]
pub trait UnitOfWork: PlanCatalog + SubscriptionRepository + ProcessedEventLedger + Send {
    /// Make every write in this unit of work durable.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}

/// Factory for units of work.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_of_work_is_object_safe() {
        fn _accepts_dyn(_uow: Box<dyn UnitOfWork>) {}
    }

    #[test]
    fn subscription_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn SubscriptionStore) {}
    }
}
