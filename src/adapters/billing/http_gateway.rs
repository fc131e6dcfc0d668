//! HTTP client for the billing provider.
//!
//! # Endpoints
//!
//! | Call | Request |
//! |------|---------|
//! | `request_payment` | `POST {base}/api/v1/payment` |
//! | `request_refund` | `POST {base}/api/v1/payment/{payment_id}/refund` |
//!
//! Calls are never retried here. A connect failure or timeout means the
//! outcome is unknown and maps to `Unavailable`; any non-2xx answer maps to
//! `Rejected` with the provider's status and body.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::BillingConfig;
use crate::domain::foundation::PaymentId;
use crate::ports::{BillingGateway, GatewayError, PaymentRequest, RefundRequest};

/// reqwest-backed `BillingGateway`.
pub struct HttpBillingGateway {
    base_url: String,
    api_token: Option<SecretString>,
    http_client: reqwest::Client,
}

impl HttpBillingGateway {
    /// Builds a client with the configured total request timeout.
    pub fn new(config: &BillingConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            http_client,
        })
    }

    fn payment_url(&self) -> String {
        format!("{}/api/v1/payment", self.base_url)
    }

    fn refund_url(&self, payment_id: &PaymentId) -> String {
        format!("{}/api/v1/payment/{}/refund", self.base_url, payment_id)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        url: String,
        body: &B,
    ) -> Result<(), GatewayError> {
        let mut request = self.http_client.post(&url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            tracing::warn!(
                operation,
                url = %url,
                error = %e,
                reason,
                "Billing provider unavailable"
            );
            GatewayError::unavailable(format!("{} {}: {}", operation, reason, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                operation,
                url = %url,
                status = status.as_u16(),
                body = %body,
                "Billing provider rejected request"
            );
            return Err(GatewayError::rejected(status.as_u16(), body));
        }

        tracing::debug!(operation, status = status.as_u16(), "Billing provider accepted request");
        Ok(())
    }
}

#[async_trait]
impl BillingGateway for HttpBillingGateway {
    async fn request_payment(&self, request: PaymentRequest) -> Result<(), GatewayError> {
        self.post("request_payment", self.payment_url(), &request).await
    }

    async fn request_refund(
        &self,
        payment_id: PaymentId,
        request: RefundRequest,
    ) -> Result<(), GatewayError> {
        self.post("request_refund", self.refund_url(&payment_id), &request)
            .await
    }
}
