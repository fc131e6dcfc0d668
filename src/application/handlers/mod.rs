//! Application handlers.
//!
//! Event appliers that turn provider outcomes into lifecycle transitions.

mod payment_event;
mod refund_event;

pub use payment_event::PaymentEventApplier;
pub use refund_event::RefundEventApplier;
