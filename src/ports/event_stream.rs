//! EventStream port - Consume/acknowledge contract for provider events.
//!
//! The stream delivers at least once. An entry that is read but never
//! acknowledged is delivered again later, to this consumer or another
//! member of the same group.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::subscription::EventTopic;

/// One delivery from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: EventTopic,
    /// Transport-assigned id used to acknowledge this delivery.
    pub delivery_id: String,
    /// Raw JSON payload.
    pub payload: Vec<u8>,
}

/// Stream transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream connection failed: {0}")]
    Connection(String),

    #[error("stream protocol error: {0}")]
    Protocol(String),

    #[error("stream closed")]
    Closed,
}

impl StreamError {
    /// Connection failures may clear up on their own; protocol errors and a
    /// closed stream will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StreamError::Connection(_))
    }
}

/// Port for a consumer-group subscription over the payment and refund topics.
#[async_trait]
pub trait EventStream: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `Ok(None)` when nothing arrived within the adapter's block
    /// timeout, so callers can check for shutdown between polls.
    async fn next(&mut self) -> Result<Option<StreamMessage>, StreamError>;

    /// Acknowledge a delivery so it is not redelivered.
    async fn ack(&mut self, message: &StreamMessage) -> Result<(), StreamError>;

    /// Release the subscription. Unacknowledged deliveries stay pending.
    async fn close(&mut self) -> Result<(), StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_stream_is_object_safe() {
        fn _accepts_dyn(_stream: Box<dyn EventStream>) {}
    }

    #[test]
    fn only_connection_errors_are_transient() {
        assert!(StreamError::Connection("reset".into()).is_transient());
        assert!(!StreamError::Protocol("WRONGTYPE".into()).is_transient());
        assert!(!StreamError::Closed.is_transient());
    }
}
