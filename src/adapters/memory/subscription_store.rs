//! In-memory subscription store for tests and local runs.
//!
//! A unit of work holds the store lock from `begin` until it is committed
//! or dropped and writes to a private copy of the state. Commit swaps the
//! copy in; drop discards it. Units of work therefore run one at a time,
//! which is stricter than Postgres row locks but gives the same outcome
//! for conflicting writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, PlanId, SubscriptionId, UserId,
};
use crate::domain::subscription::{Plan, ProcessedEvent, Subscription};
use crate::ports::{
    PlanCatalog, ProcessedEventLedger, SubscriptionRepository, SubscriptionStore, UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    plans: HashMap<PlanId, Plan>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    processed: HashMap<EventId, ProcessedEvent>,
}

/// In-memory `SubscriptionStore`.
///
/// ```ignore
/// let store = InMemorySubscriptionStore::new();
/// store.add_plan(plan).await;
/// let service = SubscriptionService::new(Arc::new(store.clone()), gateway);
/// ```
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the plan catalog.
    pub async fn add_plan(&self, plan: Plan) {
        self.state.lock().await.plans.insert(plan.id, plan);
    }

    /// Seed a subscription directly, bypassing the lifecycle service.
    pub async fn put_subscription(&self, subscription: Subscription) {
        self.state
            .lock()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
    }

    // === Test Helpers ===

    /// Committed state of one subscription.
    pub async fn subscription(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.state.lock().await.subscriptions.get(id).cloned()
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    pub async fn is_processed(&self, event_id: &EventId) -> bool {
        self.state.lock().await.processed.contains_key(event_id)
    }

    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.processed.len()
    }

    /// Make the next `commit` fail without writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        }))
    }
}

/// Open unit of work against `InMemorySubscriptionStore`.
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl PlanCatalog for InMemoryUnitOfWork {
    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(self.working.plans.get(id).cloned())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryUnitOfWork {
    async fn find_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.working.subscriptions.get(id).cloned())
    }

    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        if !self.working.plans.contains_key(&subscription.plan_id) {
            return Err(DomainError::database(format!(
                "Plan {} does not exist",
                subscription.plan_id
            )));
        }
        if self.working.subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::database(format!(
                "Subscription {} already exists",
                subscription.id
            )));
        }
        self.working
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        match self.working.subscriptions.get_mut(&subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            )),
        }
    }

    async fn list_by_user(&mut self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let mut owned: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|s| s.is_owned_by(user_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[async_trait]
impl ProcessedEventLedger for InMemoryUnitOfWork {
    async fn contains(&mut self, event_id: &EventId) -> Result<bool, DomainError> {
        Ok(self.working.processed.contains_key(event_id))
    }

    async fn record(&mut self, event: &ProcessedEvent) -> Result<(), DomainError> {
        if self.working.processed.contains_key(&event.id) {
            return Err(DomainError::new(
                ErrorCode::DuplicateEvent,
                format!("Event {} already recorded", event.id),
            ));
        }
        self.working.processed.insert(event.id, *event);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryUnitOfWork {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::database("injected commit failure"));
        }
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::PaymentId;
    use crate::domain::subscription::SubscriptionStatus;
    use rust_decimal_macros::dec;

    async fn store_with_plan() -> (InMemorySubscriptionStore, Plan) {
        let store = InMemorySubscriptionStore::new();
        let plan = Plan::new("Monthly", dec!(9.99), "USD", 30).unwrap();
        store.add_plan(plan.clone()).await;
        (store, plan)
    }

    #[tokio::test]
    async fn committed_insert_is_visible() {
        let (store, plan) = store_with_plan().await;
        let sub = Subscription::create_pending(UserId::new(), plan.id);

        let mut uow = store.begin().await.unwrap();
        uow.insert(&sub).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.subscription(&sub.id).await, Some(sub));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let (store, plan) = store_with_plan().await;
        let sub = Subscription::create_pending(UserId::new(), plan.id);

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert(&sub).await.unwrap();
            uow.record(&ProcessedEvent::now(EventId::new())).await.unwrap();
        }

        assert_eq!(store.subscription_count().await, 0);
        assert_eq!(store.processed_count().await, 0);
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let (store, plan) = store_with_plan().await;
        let sub = Subscription::create_pending(UserId::new(), plan.id);
        store.fail_next_commit();

        let mut uow = store.begin().await.unwrap();
        uow.insert(&sub).await.unwrap();
        assert!(uow.commit().await.is_err());

        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn insert_requires_existing_plan() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::create_pending(UserId::new(), PlanId::new());

        let mut uow = store.begin().await.unwrap();

        assert!(uow.insert(&sub).await.is_err());
    }

    #[tokio::test]
    async fn update_of_missing_subscription_is_not_found() {
        let (store, plan) = store_with_plan().await;
        let sub = Subscription::create_pending(UserId::new(), plan.id);

        let mut uow = store.begin().await.unwrap();
        let err = uow.update(&sub).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    #[tokio::test]
    async fn ledger_rejects_second_record() {
        let store = InMemorySubscriptionStore::new();
        let event_id = EventId::new();

        let mut uow = store.begin().await.unwrap();
        assert!(!uow.contains(&event_id).await.unwrap());
        uow.record(&ProcessedEvent::now(event_id)).await.unwrap();
        assert!(uow.contains(&event_id).await.unwrap());

        let err = uow.record(&ProcessedEvent::now(event_id)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateEvent);
    }

    #[tokio::test]
    async fn list_by_user_filters_and_orders_newest_first() {
        let (store, plan) = store_with_plan().await;
        let user = UserId::new();
        let mut older = Subscription::create_pending(user, plan.id);
        older.created_at = older.created_at.add_days(-1);
        let newer = Subscription::create_pending(user, plan.id);
        let foreign = Subscription::create_pending(UserId::new(), plan.id);
        for sub in [&older, &newer, &foreign] {
            store.put_subscription(sub.clone()).await;
        }

        let mut uow = store.begin().await.unwrap();
        let listed = uow.list_by_user(&user).await.unwrap();

        let ids: Vec<_> = listed.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn second_unit_of_work_waits_for_first() {
        let (store, plan) = store_with_plan().await;
        let mut sub = Subscription::create_pending(UserId::new(), plan.id);
        store.put_subscription(sub.clone()).await;

        let mut first = store.begin().await.unwrap();
        let store2 = store.clone();
        let id = sub.id;
        let waiter = tokio::spawn(async move {
            let mut second = store2.begin().await.unwrap();
            second.find_for_update(&id).await.unwrap()
        });

        sub.activate(PaymentId::new()).unwrap();
        first.update(&sub).await.unwrap();
        first.commit().await.unwrap();

        let seen = waiter.await.unwrap().unwrap();
        assert_eq!(seen.status, SubscriptionStatus::Active);
    }
}
