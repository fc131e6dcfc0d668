//! HTTP adapter for subscription endpoints.
//!
//! Exposes the subscription lifecycle via REST API:
//! - `GET /api/v1/subscriptions` - List the caller's subscriptions
//! - `POST /api/v1/subscriptions` - Create a subscription and start payment
//! - `POST /api/v1/subscriptions/:id/cancel` - Cancel an active subscription
//! - `POST /api/v1/subscriptions/:id/refund` - Request a refund

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, SubscriptionApiError, SubscriptionAppState};
pub use routes::{subscription_router, subscription_routes};
