//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, the state machine trait, and the error
//! vocabulary used across the subscription domain and its ports.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{EventId, PaymentId, PlanId, SubscriptionId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
