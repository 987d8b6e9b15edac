//! Shared application state.

use std::sync::Arc;

use fanout::{ChangeFeedListener, FanoutHub};
use resource_gateway::ResourceGateway;
use saga::{CombinedBookingSaga, GuideOnboardingSaga, OutcomePublisher, SagaCoordinator};
use tokio::task::JoinHandle;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<G> {
    pub gateway: G,
    pub coordinator: SagaCoordinator,
    pub booking: CombinedBookingSaga<G>,
    pub onboarding: GuideOnboardingSaga<G>,
    pub hub: Arc<FanoutHub<G>>,
}

/// Wires the sagas and the hub around one gateway.
///
/// The coordinator publishes saga outcomes through the hub.
pub fn create_default_state<G>(gateway: G, config: &Config) -> Arc<AppState<G>>
where
    G: ResourceGateway + Clone + 'static,
{
    let hub = Arc::new(FanoutHub::new(gateway.clone(), config.hub_config()));
    let publisher: Arc<dyn OutcomePublisher> = hub.clone();
    let coordinator = SagaCoordinator::new(config.coordinator_config()).with_publisher(publisher);

    Arc::new(AppState {
        booking: CombinedBookingSaga::new(gateway.clone(), config.pricing_policy()),
        onboarding: GuideOnboardingSaga::new(gateway.clone())
            .require_verification(config.require_guide_verification),
        gateway,
        coordinator,
        hub,
    })
}

/// Starts pumping the gateway's change feed into the hub.
pub fn spawn_change_listener<G>(state: &AppState<G>) -> JoinHandle<()>
where
    G: ResourceGateway + Clone + 'static,
{
    let listener = ChangeFeedListener::new(state.gateway.clone());
    let hub = state.hub.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.run(hub).await {
            tracing::error!(error = %e, "change feed listener stopped");
        }
    })
}
