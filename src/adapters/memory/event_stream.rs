//! In-memory event stream for tests.
//!
//! Mirrors consumer-group semantics closely enough for the ingestion
//! loop: a read moves an entry to the pending list, `ack` removes it,
//! and `redeliver_pending` puts unacknowledged entries back on the queue
//! the way a stream re-offers pending entries.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::subscription::EventTopic;
use crate::ports::{EventStream, StreamError, StreamMessage};

#[derive(Default)]
struct StreamState {
    queue: VecDeque<StreamMessage>,
    pending: Vec<StreamMessage>,
    acked: Vec<StreamMessage>,
    next_seq: u64,
    closed: bool,
    fail_reads: Option<(StreamError, usize)>,
}

/// Cloneable handle to an in-memory stream. Clones share state, so a test
/// can keep one handle while the ingestion loop owns another.
#[derive(Clone)]
pub struct InMemoryEventStream {
    state: Arc<Mutex<StreamState>>,
    notify: Arc<Notify>,
    idle_wait: Duration,
}

impl Default for InMemoryEventStream {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState::default())),
            notify: Arc::new(Notify::new()),
            idle_wait: Duration::from_millis(10),
        }
    }
}

impl InMemoryEventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long `next` waits on an empty queue before returning `None`.
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    /// Append a JSON payload to a topic. Returns the delivery id.
    pub async fn publish(&self, topic: EventTopic, payload: &serde_json::Value) -> String {
        self.publish_raw(topic, payload.to_string().into_bytes()).await
    }

    /// Append raw bytes to a topic. Returns the delivery id.
    pub async fn publish_raw(&self, topic: EventTopic, payload: Vec<u8>) -> String {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let delivery_id = format!("{}-{}", state.next_seq, topic);
        state.queue.push_back(StreamMessage {
            topic,
            delivery_id: delivery_id.clone(),
            payload,
        });
        drop(state);
        self.notify.notify_one();
        delivery_id
    }

    /// Re-queue every delivered but unacknowledged entry.
    pub async fn redeliver_pending(&self) -> usize {
        let mut state = self.state.lock().await;
        let pending: Vec<_> = state.pending.drain(..).collect();
        let count = pending.len();
        for message in pending.into_iter().rev() {
            state.queue.push_front(message);
        }
        drop(state);
        self.notify.notify_one();
        count
    }

    /// Make the next read fail with `error`.
    pub async fn fail_next_read(&self, error: StreamError) {
        self.fail_next_reads(error, 1).await;
    }

    /// Make the next `times` reads fail with `error`.
    pub async fn fail_next_reads(&self, error: StreamError, times: usize) {
        self.state.lock().await.fail_reads = (times > 0).then_some((error, times));
        self.notify.notify_one();
    }

    // === Test Helpers ===

    pub async fn acked_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .acked
            .iter()
            .map(|m| m.delivery_id.clone())
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl EventStream for InMemoryEventStream {
    async fn next(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        for attempt in 0..2 {
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(StreamError::Closed);
                }
                if let Some((error, remaining)) = state.fail_reads.take() {
                    if remaining > 1 {
                        state.fail_reads = Some((error.clone(), remaining - 1));
                    }
                    return Err(error);
                }
                if let Some(message) = state.queue.pop_front() {
                    state.pending.push(message.clone());
                    return Ok(Some(message));
                }
            }
            if attempt == 0 {
                let _ = tokio::time::timeout(self.idle_wait, self.notify.notified()).await;
            }
        }
        Ok(None)
    }

    async fn ack(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state
            .pending
            .iter()
            .position(|m| m.delivery_id == message.delivery_id)
        {
            let acked = state.pending.remove(pos);
            state.acked.push(acked);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}
