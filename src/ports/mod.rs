//! Ports - Interfaces between the application core and its adapters.
//!
//! Storage ports (`PlanCatalog`, `SubscriptionRepository`,
//! `ProcessedEventLedger`) are only reachable through a `UnitOfWork`, so a
//! state change and its ledger record always share one transaction.

mod billing_gateway;
mod event_handler;
mod event_stream;
mod plan_catalog;
mod processed_event_ledger;
mod subscription_repository;
mod unit_of_work;

pub use billing_gateway::{
    BillingGateway, GatewayError, GatewayErrorKind, PaymentRequest, RefundRequest,
};
pub use event_handler::{EventApplier, EventHandler, HandleOutcome};
pub use event_stream::{EventStream, StreamError, StreamMessage};
pub use plan_catalog::PlanCatalog;
pub use processed_event_ledger::ProcessedEventLedger;
pub use subscription_repository::SubscriptionRepository;
pub use unit_of_work::{SubscriptionStore, UnitOfWork};
