//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::collections::GUIDE_PROFILES;
use resource_gateway::ResourceGateway;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub observers: usize,
}

/// GET /health: checks the record store and reports live observers.
///
/// Answers 503 with `status: "degraded"` when the store cannot be read.
pub async fn check<G: ResourceGateway + Clone + 'static>(
    State(state): State<Arc<AppState<G>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = match state.gateway.recent(GUIDE_PROFILES, 1).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "health check could not read the store");
            false
        }
    };
    let observers = state.hub.observer_count().await;

    let (code, status, store) = if store_ok {
        (StatusCode::OK, "ok", "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
    };
    (
        code,
        Json(HealthResponse {
            status,
            store,
            observers,
        }),
    )
}
