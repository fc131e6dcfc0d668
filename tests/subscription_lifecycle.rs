//! End-to-end subscription lifecycle tests over the in-memory adapters.
//!
//! Covers the full request and event paths: create, payment outcome,
//! cancellation, refund request, refund outcome, plus redelivery of
//! already-processed events through the ingestion loop.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::watch;

use subscription_service::adapters::billing::RecordingBillingGateway;
use subscription_service::adapters::events::{
    EventIngestionConfig, EventIngestionLoop, IdempotentHandler, LoopState,
};
use subscription_service::adapters::memory::{InMemoryEventStream, InMemorySubscriptionStore};
use subscription_service::application::{
    CancelSubscriptionCommand, CreateSubscriptionCommand, PaymentEventApplier,
    RefundEventApplier, RequestRefundCommand, SubscriptionService,
};
use subscription_service::domain::foundation::{EventId, PaymentId, SubscriptionId, UserId};
use subscription_service::domain::subscription::{
    EventOutcome, EventTopic, Plan, ProviderEvent, SubscriptionError, SubscriptionStatus,
};
use subscription_service::ports::{EventHandler, GatewayError, HandleOutcome};

// ════════════════════════════════════════════════════════════════════════════════
// Harness
// ════════════════════════════════════════════════════════════════════════════════

struct Harness {
    store: InMemorySubscriptionStore,
    gateway: RecordingBillingGateway,
    service: Arc<SubscriptionService>,
    payments: Arc<IdempotentHandler<PaymentEventApplier>>,
    refunds: Arc<IdempotentHandler<RefundEventApplier>>,
    plan: Plan,
    user: UserId,
}

impl Harness {
    async fn new() -> Self {
        let store = InMemorySubscriptionStore::new();
        let gateway = RecordingBillingGateway::new();
        let plan = Plan::new("Monthly", dec!(9.99), "USD", 30).unwrap();
        store.add_plan(plan.clone()).await;

        let service = Arc::new(SubscriptionService::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
        ));
        let payments = Arc::new(IdempotentHandler::new(
            PaymentEventApplier::new(service.clone()),
            Arc::new(store.clone()),
        ));
        let refunds = Arc::new(IdempotentHandler::new(
            RefundEventApplier::new(service.clone()),
            Arc::new(store.clone()),
        ));

        Self {
            store,
            gateway,
            service,
            payments,
            refunds,
            plan,
            user: UserId::new(),
        }
    }

    async fn create(&self) -> SubscriptionId {
        self.service
            .create_subscription(CreateSubscriptionCommand {
                user_id: self.user,
                plan_id: self.plan.id,
                return_url: "https://shop.example.com/done".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    async fn status(&self, id: SubscriptionId) -> SubscriptionStatus {
        self.store.subscription(&id).await.unwrap().status
    }

    fn cancel_cmd(&self, id: SubscriptionId) -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            subscription_id: id,
            user_id: self.user,
        }
    }

    fn refund_cmd(&self, id: SubscriptionId) -> RequestRefundCommand {
        RequestRefundCommand {
            subscription_id: id,
            user_id: self.user,
            handler_url: "https://shop.example.com/refunds".to_string(),
        }
    }
}

fn provider_event(
    id: EventId,
    status: EventOutcome,
    subscription_id: SubscriptionId,
) -> ProviderEvent {
    let payload = json!({
        "id": id,
        "status": status,
        "extra_data": { "subscription_id": subscription_id.to_string() }
    });
    ProviderEvent::from_slice(payload.to_string().as_bytes()).unwrap()
}

// ════════════════════════════════════════════════════════════════════════════════
// Scenarios
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn payment_success_activates_and_redelivery_is_a_no_op() {
    let h = Harness::new().await;
    let id = h.create().await;
    assert_eq!(h.status(id).await, SubscriptionStatus::PendingPayment);

    let event_id = EventId::new();
    let event = provider_event(event_id, EventOutcome::Succeeded, id);

    assert_eq!(h.payments.handle(&event).await.unwrap(), HandleOutcome::Applied);
    let active = h.store.subscription(&id).await.unwrap();
    assert_eq!(active.status, SubscriptionStatus::Active);
    assert_eq!(active.payment_id, Some(PaymentId::from(event_id)));

    assert_eq!(h.payments.handle(&event).await.unwrap(), HandleOutcome::Duplicate);
    let after = h.store.subscription(&id).await.unwrap();
    assert_eq!(after, active);
    assert_eq!(h.store.processed_count().await, 1);
    assert_eq!(h.gateway.payment_requests().len(), 1);
}

#[tokio::test]
async fn cancelled_payment_leaves_subscription_pending() {
    let h = Harness::new().await;
    let id = h.create().await;

    let event = provider_event(EventId::new(), EventOutcome::Cancelled, id);

    assert_eq!(h.payments.handle(&event).await.unwrap(), HandleOutcome::Applied);
    assert_eq!(h.status(id).await, SubscriptionStatus::PendingPayment);
    assert!(h.store.is_processed(&event.id).await);
}

#[tokio::test]
async fn cancel_refund_and_refund_outcome_complete_the_lifecycle() {
    let h = Harness::new().await;
    let id = h.create().await;
    let payment_event = EventId::new();
    h.payments
        .handle(&provider_event(payment_event, EventOutcome::Succeeded, id))
        .await
        .unwrap();

    h.service.cancel(h.cancel_cmd(id)).await.unwrap();
    assert_eq!(h.status(id).await, SubscriptionStatus::Cancelled);

    h.service.request_refund(h.refund_cmd(id)).await.unwrap();
    assert_eq!(h.status(id).await, SubscriptionStatus::RefundRequested);
    let refunds = h.gateway.refund_requests();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].0, PaymentId::from(payment_event));

    let refund_event = provider_event(EventId::new(), EventOutcome::Succeeded, id);
    assert_eq!(
        h.refunds.handle(&refund_event).await.unwrap(),
        HandleOutcome::Applied
    );
    assert_eq!(h.status(id).await, SubscriptionStatus::Refunded);

    assert_eq!(
        h.refunds.handle(&refund_event).await.unwrap(),
        HandleOutcome::Duplicate
    );
    assert_eq!(h.status(id).await, SubscriptionStatus::Refunded);
}

#[tokio::test]
async fn refund_before_payment_is_rejected() {
    let h = Harness::new().await;
    let id = h.create().await;

    let err = h.service.request_refund(h.refund_cmd(id)).await.unwrap_err();

    assert!(matches!(err, SubscriptionError::InvalidTransition { .. }));
    assert!(h.gateway.refund_requests().is_empty());
    assert_eq!(h.status(id).await, SubscriptionStatus::PendingPayment);
}

#[tokio::test]
async fn gateway_timeout_on_create_leaves_no_subscription() {
    let h = Harness::new().await;
    h.gateway
        .fail_payments_with(GatewayError::unavailable("timed out"));

    let err = h
        .service
        .create_subscription(CreateSubscriptionCommand {
            user_id: h.user,
            plan_id: h.plan.id,
            return_url: "https://shop.example.com/done".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::GatewayUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(h.store.subscription_count().await, 0);
}

#[tokio::test]
async fn gateway_rejection_on_refund_keeps_subscription_cancelled() {
    let h = Harness::new().await;
    let id = h.create().await;
    h.payments
        .handle(&provider_event(EventId::new(), EventOutcome::Succeeded, id))
        .await
        .unwrap();
    h.service.cancel(h.cancel_cmd(id)).await.unwrap();
    h.gateway
        .fail_refunds_with(GatewayError::rejected(409, "already refunded"));

    let err = h.service.request_refund(h.refund_cmd(id)).await.unwrap_err();

    assert!(matches!(err, SubscriptionError::GatewayRejected { status: 409, .. }));
    assert_eq!(h.status(id).await, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn concurrent_cancels_succeed_exactly_once() {
    let h = Harness::new().await;
    let id = h.create().await;
    h.payments
        .handle(&provider_event(EventId::new(), EventOutcome::Succeeded, id))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.service.cancel(h.cancel_cmd(id)),
        h.service.cancel(h.cancel_cmd(id)),
    );

    let results = [first, second];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(SubscriptionError::InvalidTransition { .. })))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.status(id).await, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn event_for_unknown_subscription_is_recorded_without_changes() {
    let h = Harness::new().await;
    let event = provider_event(EventId::new(), EventOutcome::Succeeded, SubscriptionId::new());

    assert_eq!(h.payments.handle(&event).await.unwrap(), HandleOutcome::Applied);
    assert_eq!(h.store.subscription_count().await, 0);
    assert!(h.store.is_processed(&event.id).await);
}

// ════════════════════════════════════════════════════════════════════════════════
// Ingestion loop
// ════════════════════════════════════════════════════════════════════════════════

async fn wait_for_acks(stream: &InMemoryEventStream, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stream.acked_ids().await.len() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn ingestion_loop_drives_the_lifecycle_and_acks_everything() {
    let h = Harness::new().await;
    let id = h.create().await;
    let stream = InMemoryEventStream::new().with_idle_wait(Duration::from_millis(5));

    let payment_event = EventId::new();
    let payment = json!({
        "id": payment_event,
        "status": "succeeded",
        "extra_data": { "subscription_id": id.to_string() }
    });
    stream.publish(EventTopic::Payment, &payment).await;
    // Redelivered copy of the same provider event.
    stream.publish(EventTopic::Payment, &payment).await;
    stream
        .publish_raw(EventTopic::Payment, b"not json".to_vec())
        .await;
    stream
        .publish(
            EventTopic::Refund,
            &json!({ "id": EventId::new(), "status": "succeeded", "extra_data": null }),
        )
        .await;

    let ingestion = EventIngestionLoop::with_config(
        Box::new(stream.clone()),
        h.payments.clone(),
        h.refunds.clone(),
        EventIngestionConfig::default().with_failure_backoff(Duration::from_millis(1)),
    );
    let mut state = ingestion.state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(ingestion.run(shutdown_rx));

    wait_for_acks(&stream, 4).await;
    assert_eq!(h.status(id).await, SubscriptionStatus::Active);

    shutdown_tx.send(true).unwrap();
    let stats = task.await.unwrap().unwrap();

    assert_eq!(stats.received, 4);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.discarded, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stream.pending_count().await, 0);
    assert!(stream.is_closed().await);
    assert_eq!(*state.borrow_and_update(), LoopState::Stopped);
}
