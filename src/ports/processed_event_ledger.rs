//! ProcessedEventLedger port - Durable record of handled events.
//!
//! Events may be delivered more than once:
//! - the consumer crashed between commit and acknowledgement
//! - the stream redelivered a pending entry
//! - two consumers raced on the same entry
//!
//! A handler checks the ledger and records the event in the same unit of
//! work as the state change it guards. Either both persist or neither does.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventId};
use crate::domain::subscription::ProcessedEvent;

/// Port for the processed-event ledger.
///
/// ```ignore
/// if uow.contains(&event.id).await? {
///     return Ok(HandleOutcome::Duplicate);
/// }
/// // apply the transition...
/// uow.record(&ProcessedEvent::now(event.id)).await?;
/// uow.commit().await?;
/// ```
#[async_trait]
pub trait ProcessedEventLedger: Send {
    /// Returns `true` if the event has already been handled.
    async fn contains(&mut self, event_id: &EventId) -> Result<bool, DomainError>;

    /// Record the event as handled.
    ///
    /// # Errors
    ///
    /// `DuplicateEvent` if another unit of work recorded it first.
    async fn record(&mut self, event: &ProcessedEvent) -> Result<(), DomainError>;
}
