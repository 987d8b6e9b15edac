//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fanout::HubError;
use resource_gateway::GatewayError;
use saga::SagaError;

/// Returned in place of details when an error must only reach the operator log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error; the operations team has been notified";

/// API-level error type that maps to HTTP responses.
///
/// Every error body has the shape `{"success": false, "error": "..."}`;
/// saga step failures add `"retryable"`.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Saga validation or execution error.
    Saga(SagaError),
    /// Fan-out hub error.
    Hub(HubError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_status_code(err),
            ApiError::Hub(HubError::UnknownCollection(_)) => StatusCode::BAD_REQUEST,
            ApiError::Hub(HubError::Gateway(err)) => gateway_status_code(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::BadRequest(msg) => serde_json::json!({ "success": false, "error": msg }),
            ApiError::Saga(SagaError::Compensation(err)) => {
                // Details were already logged on the operator alert target.
                tracing::error!(
                    reference = %err.reference,
                    step = %err.step,
                    "saga left resources behind"
                );
                serde_json::json!({ "success": false, "error": INTERNAL_ERROR_MESSAGE })
            }
            ApiError::Saga(err) => serde_json::json!({
                "success": false,
                "error": err.to_string(),
                "retryable": err.is_retryable(),
            }),
            ApiError::Hub(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "hub error");
                }
                serde_json::json!({ "success": false, "error": err.to_string() })
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                serde_json::json!({ "success": false, "error": INTERNAL_ERROR_MESSAGE })
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn saga_status_code(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::StepFailed { .. } if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::StepFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SagaError::Compensation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn gateway_status_code(err: &GatewayError) -> StatusCode {
    if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        ApiError::Hub(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
