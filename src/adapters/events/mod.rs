//! Event ingestion adapters.
//!
//! - `IdempotentHandler` - Wrapper for exactly-once event effects
//! - `EventIngestionLoop` - Background consumer over the event stream
//! - `RedisEventStream` - Redis Streams consumer-group reader

mod idempotent_handler;
mod ingestion_loop;
mod redis_stream;

pub use idempotent_handler::IdempotentHandler;
pub use ingestion_loop::{EventIngestionConfig, EventIngestionLoop, IngestionStats, LoopState};
pub use redis_stream::{RedisEventStream, PAYLOAD_FIELD};
