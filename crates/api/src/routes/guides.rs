//! Guide onboarding endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{RecordId, SagaId};
use domain::GuideOnboardingRequest;
use resource_gateway::ResourceGateway;
use saga::onboarding::{STEP_IDENTITY, STEP_PROFILE};
use saga::{SagaOutcome, SagaStatus, StepResult};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct OnboardingResponse {
    pub success: bool,
    pub reference: String,
    pub status: SagaStatus,
    pub saga_id: SagaId,
    pub identity_id: Option<RecordId>,
    pub profile_id: Option<RecordId>,
    pub results: Vec<StepResult>,
}

/// Returned when a failed onboarding was rolled back cleanly.
#[derive(Serialize)]
pub struct RolledBackResponse {
    pub success: bool,
    pub error: String,
    pub retryable: bool,
    pub status: SagaStatus,
    pub reference: String,
    pub results: Vec<StepResult>,
    pub compensations: Vec<StepResult>,
}

/// POST /guides/onboard: create identity, profile and verification records
/// as one unit.
#[tracing::instrument(skip(state, payload))]
pub async fn onboard<G: ResourceGateway + Clone + 'static>(
    State(state): State<Arc<AppState<G>>>,
    payload: Result<Json<GuideOnboardingRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let result = state.onboarding.execute(&state.coordinator, request).await?;
    let outcome = result.outcome;

    match outcome.status() {
        SagaStatus::Completed | SagaStatus::PartiallyCompleted => {
            Ok(Json(onboarded(&outcome)).into_response())
        }
        SagaStatus::Compensated => Ok(rolled_back(&outcome)),
        SagaStatus::Failed => Err(outcome
            .error()
            .map(ApiError::from)
            .unwrap_or_else(|| ApiError::Internal("onboarding failed".to_string()))),
    }
}

fn onboarded(outcome: &SagaOutcome) -> OnboardingResponse {
    let resource_id = |step: &str| {
        outcome
            .results()
            .iter()
            .find(|r| r.succeeded && r.step_name == step)
            .and_then(|r| r.resource_id)
    };
    OnboardingResponse {
        success: true,
        reference: outcome.reference().to_string(),
        status: outcome.status(),
        saga_id: outcome.saga_id(),
        identity_id: resource_id(STEP_IDENTITY),
        profile_id: resource_id(STEP_PROFILE),
        results: outcome.results().to_vec(),
    }
}

fn rolled_back(outcome: &SagaOutcome) -> Response {
    let retryable = outcome.is_retryable();
    let status = if retryable {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    let error = outcome
        .error()
        .map_or_else(|| "onboarding rolled back".to_string(), |e| e.to_string());
    tracing::warn!(reference = %outcome.reference(), %error, "guide onboarding rolled back");

    let body = RolledBackResponse {
        success: false,
        error,
        retryable,
        status: outcome.status(),
        reference: outcome.reference().to_string(),
        results: outcome.results().to_vec(),
        compensations: outcome.compensation_results().to_vec(),
    };
    (status, Json(body)).into_response()
}
