//! Dashboard aggregates endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use fanout::AggregateSnapshot;
use resource_gateway::ResourceGateway;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /aggregates: recomputes and returns the dashboard aggregates.
pub async fn get<G: ResourceGateway + Clone + 'static>(
    State(state): State<Arc<AppState<G>>>,
) -> Result<Json<AggregateSnapshot>, ApiError> {
    Ok(Json(state.hub.compute_aggregates().await?))
}
