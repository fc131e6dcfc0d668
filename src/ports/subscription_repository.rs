//! SubscriptionRepository port - Persistence for the Subscription aggregate.
//!
//! Methods run inside the caller's unit of work. Reads taken with
//! `find_for_update` hold a row lock until that unit of work ends, so
//! two requests touching the same subscription serialize.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use crate::domain::subscription::Subscription;

/// Repository port for Subscription aggregate persistence.
#[async_trait]
pub trait SubscriptionRepository: Send {
    /// Load a subscription and lock it for the rest of the unit of work.
    async fn find_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Insert a new subscription.
    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Persist status, payment id, and `updated_at`.
    ///
    /// # Errors
    ///
    /// `SubscriptionNotFound` if no row exists.
    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    /// All subscriptions owned by a user, newest first.
    async fn list_by_user(&mut self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError>;
}
