//! Combined booking endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use common::SagaId;
use domain::{CombinedBookingRequest, PriceBreakdown};
use resource_gateway::ResourceGateway;
use saga::{SagaStatus, StepResult};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    pub success: bool,
    pub reference: String,
    pub status: SagaStatus,
    pub saga_id: SagaId,
    pub results: Vec<StepResult>,
    pub breakdown: PriceBreakdown,
}

/// POST /bookings/combined: book up to three legs independently.
///
/// Succeeds when at least one leg was booked; per-leg failures are listed in
/// `results`.
#[tracing::instrument(skip(state, payload))]
pub async fn create<G: ResourceGateway + Clone + 'static>(
    State(state): State<Arc<AppState<G>>>,
    payload: Result<Json<CombinedBookingRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, ApiError> {
    let Json(request) = payload?;
    let result = state.booking.execute(&state.coordinator, request).await?;
    let outcome = result.outcome;

    if let Some(err) = outcome.error() {
        tracing::warn!(reference = %outcome.reference(), error = %err, "combined booking failed");
        return Err(err.into());
    }

    Ok(Json(BookingResponse {
        success: true,
        reference: outcome.reference().to_string(),
        status: outcome.status(),
        saga_id: outcome.saga_id(),
        results: outcome.results().to_vec(),
        breakdown: result.plan.breakdown,
    }))
}
