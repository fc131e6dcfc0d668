//! HTTP adapters - REST API implementations.
//!
//! `app_router` assembles the public surface: the versioned subscription
//! API plus a health check, wrapped in request tracing and a per-request
//! timeout. `serve_with_ingestion` runs that router alongside the event
//! ingestion loop.

pub mod health;
pub mod server;
pub mod subscription;

use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use server::{serve_with_ingestion, ServeError};
pub use subscription::{subscription_router, SubscriptionAppState};

/// Build the service router.
pub fn app_router(state: SubscriptionAppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/v1", subscription_router())
        .merge(health::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
