//! In-memory adapters for tests and local development.

mod event_stream;
mod subscription_store;

pub use event_stream::InMemoryEventStream;
pub use subscription_store::{InMemorySubscriptionStore, InMemoryUnitOfWork};
