//! Recording billing gateway for testing.
//!
//! Records every request and answers from a script:
//! - Call tracking for assertions
//! - Error injection per operation

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::PaymentId;
use crate::ports::{BillingGateway, GatewayError, PaymentRequest, RefundRequest};

/// In-process `BillingGateway` that accepts everything unless told otherwise.
///
/// # Example
///
/// ```ignore
/// let gateway = RecordingBillingGateway::new();
/// gateway.fail_payments_with(GatewayError::unavailable("timed out"));
///
/// let service = SubscriptionService::new(store, Arc::new(gateway.clone()));
/// // ...
/// assert!(gateway.payment_requests().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct RecordingBillingGateway {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    payments: Vec<PaymentRequest>,
    refunds: Vec<(PaymentId, RefundRequest)>,
    payment_error: Option<GatewayError>,
    refund_error: Option<GatewayError>,
}

impl RecordingBillingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every payment request with `error` until cleared.
    pub fn fail_payments_with(&self, error: GatewayError) {
        self.state().payment_error = Some(error);
    }

    /// Fail every refund request with `error` until cleared.
    pub fn fail_refunds_with(&self, error: GatewayError) {
        self.state().refund_error = Some(error);
    }

    /// Accept all requests again.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.payment_error = None;
        state.refund_error = None;
    }

    /// Accepted payment requests, in call order.
    pub fn payment_requests(&self) -> Vec<PaymentRequest> {
        self.state().payments.clone()
    }

    /// Accepted refund requests, in call order.
    pub fn refund_requests(&self) -> Vec<(PaymentId, RefundRequest)> {
        self.state().refunds.clone()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BillingGateway for RecordingBillingGateway {
    async fn request_payment(&self, request: PaymentRequest) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.payment_error.clone() {
            return Err(error);
        }
        state.payments.push(request);
        Ok(())
    }

    async fn request_refund(
        &self,
        payment_id: PaymentId,
        request: RefundRequest,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.refund_error.clone() {
            return Err(error);
        }
        state.refunds.push((payment_id, request));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PlanId, SubscriptionId, UserId};
    use rust_decimal_macros::dec;

    fn payment() -> PaymentRequest {
        PaymentRequest::for_subscription(
            UserId::new(),
            SubscriptionId::new(),
            PlanId::new(),
            dec!(5.00),
            "EUR",
            "https://shop.example.com/return",
        )
    }

    #[tokio::test]
    async fn records_accepted_requests() {
        let gateway = RecordingBillingGateway::new();
        let request = payment();

        gateway.request_payment(request.clone()).await.unwrap();

        assert_eq!(gateway.payment_requests(), vec![request]);
        assert!(gateway.refund_requests().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_is_not_recorded_until_cleared() {
        let gateway = RecordingBillingGateway::new();
        gateway.fail_payments_with(GatewayError::rejected(400, "bad request"));

        let err = gateway.request_payment(payment()).await.unwrap_err();
        assert_eq!(err.status, Some(400));
        assert!(gateway.payment_requests().is_empty());

        gateway.clear_failures();
        gateway.request_payment(payment()).await.unwrap();
        assert_eq!(gateway.payment_requests().len(), 1);
    }

    #[tokio::test]
    async fn clones_share_recordings() {
        let gateway = RecordingBillingGateway::new();
        let handle = gateway.clone();
        let request = RefundRequest::for_subscription(
            SubscriptionId::new(),
            dec!(5.00),
            "EUR",
            "https://hooks.example.com/refund",
        );

        gateway.request_refund(PaymentId::new(), request).await.unwrap();

        assert_eq!(handle.refund_requests().len(), 1);
    }
}
