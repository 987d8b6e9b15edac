//! HTTP and WebSocket server for the travel booking platform.
//!
//! Exposes the combined booking and guide onboarding sagas, the live
//! dashboard channel, and health and Prometheus metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use resource_gateway::ResourceGateway;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, create_default_state, spawn_change_listener};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G: ResourceGateway + Clone + 'static>(
    state: Arc<AppState<G>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<G>))
        .route("/bookings/combined", post(routes::bookings::create::<G>))
        .route("/guides/onboard", post(routes::guides::onboard::<G>))
        .route("/aggregates", get(routes::aggregates::get::<G>))
        .route("/live", get(routes::live::connect::<G>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
