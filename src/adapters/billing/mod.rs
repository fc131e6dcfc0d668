//! Billing provider adapters.
//!
//! - `HttpBillingGateway` - reqwest client for the provider's payment API
//! - `RecordingBillingGateway` - Call-recording double for tests

mod http_gateway;
mod recording_gateway;

pub use http_gateway::HttpBillingGateway;
pub use recording_gateway::RecordingBillingGateway;
