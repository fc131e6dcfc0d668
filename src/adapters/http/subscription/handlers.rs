//! HTTP handlers for subscription endpoints.
//!
//! These handlers connect Axum routes to the subscription service.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::application::{
    CancelSubscriptionCommand, CreateSubscriptionCommand, RequestRefundCommand,
    SubscriptionService,
};
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionError;

use super::dto::{
    CreateSubscriptionRequest, ErrorResponse, RefundSubscriptionRequest, SubscriptionResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for subscription routes.
#[derive(Clone)]
pub struct SubscriptionAppState {
    pub service: Arc<SubscriptionService>,
}

impl SubscriptionAppState {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        Self { service }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (set by the auth layer in front of this service)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from request.
///
/// Authentication happens upstream; the verified user id arrives in the
/// `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/subscriptions - List the caller's subscriptions, newest first
pub async fn list_subscriptions(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let subscriptions = state.service.list_for_user(user.user_id).await?;

    let response: Vec<SubscriptionResponse> = subscriptions
        .into_iter()
        .map(SubscriptionResponse::from)
        .collect();

    Ok(Json(response))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/v1/subscriptions - Create a subscription and start payment
pub async fn create_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    request: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let Json(request) = request?;
    require_http_url("return_url", &request.return_url)?;

    let cmd = CreateSubscriptionCommand {
        user_id: user.user_id,
        plan_id: request.plan_id,
        return_url: request.return_url,
    };

    let subscription = state.service.create_subscription(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// POST /api/v1/subscriptions/{id}/cancel - Cancel an active subscription
pub async fn cancel_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    subscription_id: Result<Path<SubscriptionId>, PathRejection>,
) -> Result<StatusCode, SubscriptionApiError> {
    let Path(subscription_id) = subscription_id?;
    let cmd = CancelSubscriptionCommand {
        subscription_id,
        user_id: user.user_id,
    };

    state.service.cancel(cmd).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/subscriptions/{id}/refund - Request a refund
pub async fn refund_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    subscription_id: Result<Path<SubscriptionId>, PathRejection>,
    request: Result<Json<RefundSubscriptionRequest>, JsonRejection>,
) -> Result<StatusCode, SubscriptionApiError> {
    let Path(subscription_id) = subscription_id?;
    let Json(request) = request?;
    require_http_url("handler_url", &request.handler_url)?;

    let cmd = RequestRefundCommand {
        subscription_id,
        user_id: user.user_id,
        handler_url: request.handler_url,
    };

    state.service.request_refund(cmd).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Accepts only absolute `http`/`https` URLs with a host.
fn require_http_url(field: &'static str, value: &str) -> Result<(), SubscriptionApiError> {
    let valid = reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(SubscriptionApiError(SubscriptionError::validation(
            field,
            "must be an absolute http(s) URL",
        )))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts subscription errors to HTTP responses.
#[derive(Debug)]
pub struct SubscriptionApiError(SubscriptionError);

impl From<SubscriptionError> for SubscriptionApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

/// Unreadable bodies get the same JSON error envelope as other failures.
impl From<JsonRejection> for SubscriptionApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SubscriptionError::validation("body", rejection.body_text()))
    }
}

impl From<PathRejection> for SubscriptionApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(SubscriptionError::validation("id", rejection.body_text()))
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            SubscriptionError::NotFound(_)
            | SubscriptionError::PlanUnavailable(_)
            | SubscriptionError::PlanNotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::InvalidTransition { .. }
            | SubscriptionError::PaymentIncomplete(_) => StatusCode::CONFLICT,
            SubscriptionError::ValidationFailed { .. }
            | SubscriptionError::MalformedEvent(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::GatewayRejected { .. } => StatusCode::BAD_GATEWAY,
            SubscriptionError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SubscriptionError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ErrorResponse::new(self.0.code().to_string(), self.0.message());
        match &self.0 {
            SubscriptionError::ValidationFailed { field, .. } => {
                body = body.with_details(json!({ "field": field }));
            }
            SubscriptionError::InvalidTransition { current, attempted } => {
                body = body.with_details(json!({ "current": current, "attempted": attempted }));
            }
            SubscriptionError::Infrastructure(detail) => {
                tracing::error!(error = %detail, "Request failed with infrastructure error");
                body = ErrorResponse::new(self.0.code().to_string(), "Internal error");
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
