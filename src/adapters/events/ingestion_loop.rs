//! EventIngestionLoop - Background consumer for billing provider events.
//!
//! Pulls payment and refund outcomes off the event stream and hands each
//! one to the handler for its topic. The handler commits its own unit of
//! work; only then is the delivery acknowledged.
//!
//! ## Delivery Rules
//!
//! | Result | Ack | Counter |
//! |--------|-----|---------|
//! | Malformed payload | yes | `discarded` |
//! | `Applied` | yes | `processed` |
//! | `Duplicate` | yes | `duplicates` |
//! | `Discarded` | yes | `discarded` |
//! | Handler error | no | `failed` |
//!
//! Unacknowledged deliveries stay pending on the stream and come back on a
//! later read. A message that always fails is retried forever.
//!
//! ## Stream Errors
//!
//! A connection error from the stream is retried with a doubling delay,
//! up to `stream_retry_limit` times in a row. Any successful read resets
//! the count. Protocol errors, a closed stream, or running out of retries
//! stop the loop and `run` returns the error.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `failure_backoff` | 100ms | Pause after a handler error |
//! | `stream_retry_limit` | 5 | Consecutive connection errors tolerated |
//! | `stream_retry_backoff` | 500ms | First retry delay, doubled per attempt |
//! | `max_stream_retry_backoff` | 30s | Cap on the retry delay |
//!
//! ## Graceful Shutdown
//!
//! The loop listens for a shutdown signal, finishes the message it is
//! working on, closes the stream, and returns its counters.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::subscription::{EventTopic, ProviderEvent};
use crate::ports::{EventHandler, EventStream, HandleOutcome, StreamError, StreamMessage};

/// Lifecycle of the loop, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Stopped => "stopped",
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub received: u64,
    pub processed: u64,
    pub duplicates: u64,
    pub discarded: u64,
    pub failed: u64,
}

/// Configuration for the EventIngestionLoop.
#[derive(Debug, Clone)]
pub struct EventIngestionConfig {
    /// How long to pause after a handler error before reading again.
    pub failure_backoff: Duration,
    /// Consecutive transient stream errors tolerated before giving up.
    pub stream_retry_limit: u32,
    /// Delay before the first stream retry.
    pub stream_retry_backoff: Duration,
    /// Upper bound for the doubled retry delay.
    pub max_stream_retry_backoff: Duration,
}

impl Default for EventIngestionConfig {
    fn default() -> Self {
        Self {
            failure_backoff: Duration::from_millis(100),
            stream_retry_limit: 5,
            stream_retry_backoff: Duration::from_millis(500),
            max_stream_retry_backoff: Duration::from_secs(30),
        }
    }
}

impl EventIngestionConfig {
    /// Create config with custom failure backoff.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Create config with a custom stream retry policy.
    pub fn with_stream_retry(mut self, limit: u32, backoff: Duration) -> Self {
        self.stream_retry_limit = limit;
        self.stream_retry_backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn stream_retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.stream_retry_backoff
            .saturating_mul(factor)
            .min(self.max_stream_retry_backoff)
    }
}

/// Sequential consumer over the payment and refund topics.
pub struct EventIngestionLoop {
    stream: Box<dyn EventStream>,
    payment_handler: Arc<dyn EventHandler>,
    refund_handler: Arc<dyn EventHandler>,
    config: EventIngestionConfig,
    state: watch::Sender<LoopState>,
    stats: IngestionStats,
}

impl EventIngestionLoop {
    /// Create a new loop with default configuration.
    pub fn new(
        stream: Box<dyn EventStream>,
        payment_handler: Arc<dyn EventHandler>,
        refund_handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self::with_config(
            stream,
            payment_handler,
            refund_handler,
            EventIngestionConfig::default(),
        )
    }

    /// Create a new loop with custom configuration.
    pub fn with_config(
        stream: Box<dyn EventStream>,
        payment_handler: Arc<dyn EventHandler>,
        refund_handler: Arc<dyn EventHandler>,
        config: EventIngestionConfig,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Stopped);
        Self {
            stream,
            payment_handler,
            refund_handler,
            config,
            state,
            stats: IngestionStats::default(),
        }
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Counters so far.
    pub fn stats(&self) -> IngestionStats {
        self.stats
    }

    /// Run the loop until shutdown is signalled or the stream fails for good.
    ///
    /// # Returns
    ///
    /// The run's counters on graceful shutdown, or the stream error that
    /// stopped the loop.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<IngestionStats, StreamError> {
        self.set_state(LoopState::Starting);
        tracing::info!(
            payment_handler = self.payment_handler.name(),
            refund_handler = self.refund_handler.name(),
            "Event ingestion loop starting"
        );
        self.set_state(LoopState::Running);

        let mut consecutive_errors: u32 = 0;
        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let polled = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }

                next = self.stream.next() => next,
            };

            let outcome = match polled {
                Ok(Some(message)) => self.process(message).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => consecutive_errors = 0,
                Err(e)
                    if e.is_transient()
                        && consecutive_errors < self.config.stream_retry_limit =>
                {
                    consecutive_errors += 1;
                    let delay = self.config.stream_retry_delay(consecutive_errors);
                    tracing::warn!(
                        error = %e,
                        attempt = consecutive_errors,
                        limit = self.config.stream_retry_limit,
                        delay_ms = delay.as_millis() as u64,
                        "Event stream error, retrying"
                    );

                    tokio::select! {
                        biased;

                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break Ok(());
                            }
                        }

                        _ = time::sleep(delay) => {}
                    }
                }
                Err(e) => break Err(e),
            }
        };

        self.set_state(LoopState::Stopping);
        if let Err(e) = &result {
            tracing::error!(error = %e, "Event stream failed, stopping ingestion loop");
        }
        if let Err(e) = self.stream.close().await {
            tracing::warn!(error = %e, "Failed to close event stream");
        }
        self.set_state(LoopState::Stopped);

        let stats = self.stats;
        tracing::info!(
            received = stats.received,
            processed = stats.processed,
            duplicates = stats.duplicates,
            discarded = stats.discarded,
            failed = stats.failed,
            "Event ingestion loop stopped"
        );
        result.map(|()| stats)
    }

    /// Read and process at most one message (for testing).
    ///
    /// Returns `true` if a message was read.
    pub async fn poll_once(&mut self) -> Result<bool, StreamError> {
        match self.stream.next().await? {
            Some(message) => {
                self.process(message).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn process(&mut self, message: StreamMessage) -> Result<(), StreamError> {
        self.stats.received += 1;

        let event = match ProviderEvent::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    topic = %message.topic,
                    delivery_id = %message.delivery_id,
                    error = %e,
                    "Discarding malformed event"
                );
                self.stats.discarded += 1;
                return self.stream.ack(&message).await;
            }
        };

        let handler = match message.topic {
            EventTopic::Payment => self.payment_handler.clone(),
            EventTopic::Refund => self.refund_handler.clone(),
        };

        match handler.handle(&event).await {
            Ok(outcome) => {
                match outcome {
                    HandleOutcome::Applied => self.stats.processed += 1,
                    HandleOutcome::Duplicate => self.stats.duplicates += 1,
                    HandleOutcome::Discarded => self.stats.discarded += 1,
                }
                tracing::debug!(
                    topic = %message.topic,
                    delivery_id = %message.delivery_id,
                    event_id = %event.id,
                    ?outcome,
                    "Event handled"
                );
                self.stream.ack(&message).await
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::error!(
                    topic = %message.topic,
                    delivery_id = %message.delivery_id,
                    event_id = %event.id,
                    handler = handler.name(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Event handling failed, leaving delivery pending"
                );
                if !self.config.failure_backoff.is_zero() {
                    time::sleep(self.config.failure_backoff).await;
                }
                Ok(())
            }
        }
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
        tracing::debug!(%state, "Event ingestion loop state changed");
    }
}
