//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application core to external systems:
//! - `billing` - Billing provider HTTP client
//! - `events` - Event stream consumer and idempotent dispatch
//! - `http` - REST API
//! - `memory` - In-memory store and stream for tests
//! - `postgres` - Transactional subscription store

pub mod billing;
pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;

pub use billing::{HttpBillingGateway, RecordingBillingGateway};
pub use events::{EventIngestionLoop, IdempotentHandler, RedisEventStream};
pub use memory::{InMemoryEventStream, InMemorySubscriptionStore};
pub use postgres::PostgresSubscriptionStore;
