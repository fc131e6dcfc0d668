//! PostgreSQL adapters - Database implementations of the storage ports.
//!
//! - `PostgresSubscriptionStore` - Hands out transaction-backed units of work

mod subscription_store;

pub use subscription_store::{PostgresSubscriptionStore, PostgresUnitOfWork};
