//! Subscription domain - plans, the subscription aggregate, and the
//! provider events that drive it.

mod aggregate;
mod errors;
mod events;
mod plan;
mod status;

pub use aggregate::Subscription;
pub use errors::SubscriptionError;
pub use events::{EventOutcome, EventTopic, ProviderEvent};
pub use plan::{Plan, PlanStatus};
pub use status::{SubscriptionStatus, Transition};

use crate::domain::foundation::{EventId, Timestamp};
use serde::{Deserialize, Serialize};

/// Ledger entry proving an event was handled.
///
/// Write-once. Not tied to any subscription so the ledger can guard any
/// event-bearing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub id: EventId,
    pub processed_at: Timestamp,
}

impl ProcessedEvent {
    pub fn now(id: EventId) -> Self {
        Self {
            id,
            processed_at: Timestamp::now(),
        }
    }
}
