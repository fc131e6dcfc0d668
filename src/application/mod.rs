//! Application layer - Lifecycle service and event handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;
mod subscription_service;

pub use handlers::{PaymentEventApplier, RefundEventApplier};
pub use subscription_service::{
    CancelSubscriptionCommand, CreateSubscriptionCommand, RequestRefundCommand,
    SubscriptionService,
};
