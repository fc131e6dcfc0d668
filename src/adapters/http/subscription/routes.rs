//! Axum router configuration for subscription endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, create_subscription, list_subscriptions, refund_subscription,
    SubscriptionAppState,
};

/// Create the subscription API router.
///
/// # Routes
///
/// All routes require the `X-User-Id` header.
/// - `GET /` - List the caller's subscriptions
/// - `POST /` - Create a subscription and start payment
/// - `POST /:id/cancel` - Cancel an active subscription
/// - `POST /:id/refund` - Request a refund
pub fn subscription_routes() -> Router<SubscriptionAppState> {
    Router::new()
        .route("/", get(list_subscriptions).post(create_subscription))
        .route("/:id/cancel", post(cancel_subscription))
        .route("/:id/refund", post(refund_subscription))
}

/// Create the complete subscription module router, mounted at
/// `/subscriptions`.
pub fn subscription_router() -> Router<SubscriptionAppState> {
    Router::new().nest("/subscriptions", subscription_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    use crate::adapters::billing::RecordingBillingGateway;
    use crate::adapters::memory::InMemorySubscriptionStore;
    use crate::application::SubscriptionService;
    use crate::domain::foundation::{PaymentId, SubscriptionId, UserId};
    use crate::domain::subscription::{Plan, Subscription, SubscriptionStatus};
    use crate::ports::GatewayError;

    // ───────────────────────────────────────────────────────────────
    // Fixture
    // ───────────────────────────────────────────────────────────────

    struct TestApp {
        router: Router,
        store: InMemorySubscriptionStore,
        gateway: RecordingBillingGateway,
        plan: Plan,
        user: UserId,
    }

    async fn test_app() -> TestApp {
        let store = InMemorySubscriptionStore::new();
        let gateway = RecordingBillingGateway::new();
        let plan = Plan::new("Monthly", dec!(9.99), "USD", 30).unwrap();
        store.add_plan(plan.clone()).await;

        let service = SubscriptionService::new(Arc::new(store.clone()), Arc::new(gateway.clone()));
        let router = subscription_router().with_state(SubscriptionAppState::new(Arc::new(service)));

        TestApp {
            router,
            store,
            gateway,
            plan,
            user: UserId::new(),
        }
    }

    fn post_json(uri: &str, user: Option<&UserId>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed_active(app: &TestApp) -> SubscriptionId {
        let mut subscription = Subscription::create_pending(app.user, app.plan.id);
        subscription.activate(PaymentId::new()).unwrap();
        let id = subscription.id;
        app.store.put_subscription(subscription).await;
        id
    }

    // ───────────────────────────────────────────────────────────────
    // Tests
    // ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_returns_pending_subscription() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions",
                Some(&app.user),
                serde_json::json!({
                    "plan_id": app.plan.id,
                    "return_url": "https://shop.example.com/done"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "PENDING_PAYMENT");
        assert_eq!(body["plan_id"], app.plan.id.to_string());
        assert_eq!(app.store.subscription_count().await, 1);
        assert_eq!(app.gateway.payment_requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions",
                None,
                serde_json::json!({
                    "plan_id": app.plan.id,
                    "return_url": "https://shop.example.com/done"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "AUTHENTICATION_REQUIRED");
        assert_eq!(app.store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn create_rejects_relative_return_url() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions",
                Some(&app.user),
                serde_json::json!({ "plan_id": app.plan.id, "return_url": "/done" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "return_url");
        assert!(app.gateway.payment_requests().is_empty());
    }

    #[tokio::test]
    async fn create_with_malformed_plan_id_is_json_validation_error() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions",
                Some(&app.user),
                serde_json::json!({
                    "plan_id": "not-a-uuid",
                    "return_url": "https://shop.example.com/done"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("application/json"));
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "body");
        assert_eq!(app.store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn create_without_json_content_type_is_validation_error() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/subscriptions")
                    .header("X-User-Id", app.user.to_string())
                    .body(Body::from("plan_id=1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn cancel_with_malformed_id_is_validation_error() {
        let app = test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions/not-a-uuid/cancel",
                Some(&app.user),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "id");
    }

    #[tokio::test]
    async fn create_with_gateway_outage_is_service_unavailable() {
        let app = test_app().await;
        app.gateway
            .fail_payments_with(GatewayError::unavailable("timed out"));

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/subscriptions",
                Some(&app.user),
                serde_json::json!({
                    "plan_id": app.plan.id,
                    "return_url": "https://shop.example.com/done"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(app.store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_active_returns_no_content() {
        let app = test_app().await;
        let id = seed_active(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/subscriptions/{}/cancel", id),
                Some(&app.user),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let stored = app.store.subscription(&id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_someone_elses_subscription_is_not_found() {
        let app = test_app().await;
        let id = seed_active(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/subscriptions/{}/cancel", id),
                Some(&UserId::new()),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "SUBSCRIPTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn refund_of_active_subscription_is_conflict() {
        let app = test_app().await;
        let id = seed_active(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/subscriptions/{}/refund", id),
                Some(&app.user),
                serde_json::json!({ "handler_url": "https://shop.example.com/refunds" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "INVALID_STATE_TRANSITION");
        assert!(app.gateway.refund_requests().is_empty());
    }

    #[tokio::test]
    async fn list_returns_callers_subscriptions() {
        let app = test_app().await;
        seed_active(&app).await;
        app.store
            .put_subscription(Subscription::create_pending(UserId::new(), app.plan.id))
            .await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/subscriptions")
                    .header("X-User-Id", app.user.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["status"], "ACTIVE");
    }
}
