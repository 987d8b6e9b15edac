//! The fan-out hub: observer registry, snapshot-then-live delivery and
//! aggregate recomputation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::ObserverId;
use resource_gateway::ResourceGateway;
use saga::{OutcomePublisher, SagaOutcome};
use tokio::sync::{Mutex, mpsc};

use crate::aggregates::{Aggregator, DashboardAggregator};
use crate::error::{DeliveryError, HubError, Result};
use crate::event::{AggregateSnapshot, ChangeEvent, HubMessage};
use crate::listener::ChangeSink;
use crate::observer::{Observer, Subscription};

const DEFAULT_RECENT_RECORDS: usize = 20;
const DEFAULT_OBSERVER_BUFFER: usize = 256;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Collections observers may subscribe to.
    pub collections: Vec<String>,
    /// Records per collection included in the initial snapshot.
    pub recent_records: usize,
    /// Capacity of each observer's queue.
    pub observer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            collections: domain::collections::ALL
                .iter()
                .map(|c| c.to_string())
                .collect(),
            recent_records: DEFAULT_RECENT_RECORDS,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
        }
    }
}

#[derive(Default)]
struct HubState {
    observers: HashMap<ObserverId, Observer>,
    /// Highest sequence processed per collection.
    watermarks: HashMap<String, u64>,
    latest_snapshot: Option<AggregateSnapshot>,
}

/// Broadcasts changes, aggregates and saga outcomes to observers.
///
/// All registry and snapshot mutations happen under one lock, which is what
/// makes a subscription's initial snapshot and its first live event line up:
/// an event is either reflected in the snapshot's watermark or delivered
/// afterwards, never both and never neither.
pub struct FanoutHub<G> {
    gateway: G,
    config: HubConfig,
    aggregators: Vec<Arc<dyn Aggregator>>,
    state: Mutex<HubState>,
}

impl<G> FanoutHub<G>
where
    G: ResourceGateway + Clone + 'static,
{
    /// Creates a hub computing the dashboard aggregates.
    pub fn new(gateway: G, config: HubConfig) -> Self {
        let dashboard: Arc<dyn Aggregator> = Arc::new(DashboardAggregator::new(gateway.clone()));
        Self::with_aggregators(gateway, config, vec![dashboard])
    }

    pub fn with_aggregators(
        gateway: G,
        config: HubConfig,
        aggregators: Vec<Arc<dyn Aggregator>>,
    ) -> Self {
        Self {
            gateway,
            config,
            aggregators,
            state: Mutex::new(HubState::default()),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Registers an observer for `collections` (empty = every watched
    /// collection).
    ///
    /// The returned subscription's first message is an `initial-snapshot`;
    /// live events follow, starting after the hub's processed watermark.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self, collections: Vec<String>) -> Result<Subscription> {
        let collections = self.resolve_collections(collections)?;

        let mut state = self.state.lock().await;
        let snapshot = self.compute_snapshot().await?;
        let mut recent = BTreeMap::new();
        for collection in &collections {
            let records = self
                .gateway
                .recent(collection, self.config.recent_records)
                .await?;
            recent.insert(
                collection.clone(),
                records.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            );
        }

        let watermarks: BTreeMap<String, u64> = collections
            .iter()
            .map(|c| (c.clone(), state.watermarks.get(c).copied().unwrap_or(0)))
            .collect();
        let last_delivered = watermarks.clone().into_iter().collect();
        let (sender, receiver) = mpsc::channel(self.config.observer_buffer.max(1));
        let observer = Observer::new(collections, last_delivered, sender);
        if let Err(e) = observer.deliver(Arc::new(HubMessage::InitialSnapshot {
            snapshot: snapshot.clone(),
            recent,
            watermarks,
        })) {
            tracing::warn!(error = %e, "initial snapshot could not be enqueued");
        }

        let subscription = Subscription::new(&observer, receiver);
        tracing::info!(
            observer_id = %observer.id,
            collections = ?subscription.collections,
            "observer subscribed"
        );
        state.observers.insert(observer.id, observer);
        state.latest_snapshot = Some(snapshot);
        metrics::gauge!("hub_observers").set(state.observers.len() as f64);

        Ok(subscription)
    }

    /// Removes an observer. Returns false if it was not registered.
    pub async fn unsubscribe(&self, observer_id: ObserverId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.observers.remove(&observer_id).is_some();
        if removed {
            tracing::info!(%observer_id, "observer unsubscribed");
            metrics::gauge!("hub_observers").set(state.observers.len() as f64);
        }
        removed
    }

    /// Delivers one change to every observer of its collection that has not
    /// seen it. When the change affects aggregates, a fresh snapshot then
    /// goes to every observer.
    #[tracing::instrument(
        skip(self, event),
        fields(collection = %event.collection, sequence = event.sequence)
    )]
    pub async fn on_change(&self, event: ChangeEvent) -> Result<()> {
        let mut state = self.state.lock().await;

        let watermark = state.watermarks.entry(event.collection.clone()).or_insert(0);
        let redelivered = event.sequence <= *watermark;
        *watermark = (*watermark).max(event.sequence);

        let refresh = if !redelivered && self.affects_aggregates(&event.collection) {
            metrics::counter!("hub_aggregate_recomputations_total").increment(1);
            Some(self.compute_snapshot().await)
        } else {
            None
        };

        let change = Arc::new(HubMessage::ChangeEvent {
            event: event.clone(),
        });
        let mut failed = Vec::new();
        for observer in state.observers.values_mut() {
            if !observer.watches(&event.collection)
                || !observer.is_new(&event.collection, event.sequence)
            {
                continue;
            }
            match observer.deliver(change.clone()) {
                Ok(()) => {
                    observer
                        .last_delivered
                        .insert(event.collection.clone(), event.sequence);
                    metrics::counter!("hub_events_delivered_total").increment(1);
                }
                Err(e) => failed.push(e),
            }
        }
        Self::drop_failed(&mut state, failed);

        match refresh {
            Some(Ok(snapshot)) => {
                let update = Arc::new(HubMessage::AggregateUpdate {
                    snapshot: snapshot.clone(),
                });
                let failed = state
                    .observers
                    .values()
                    .filter_map(|observer| observer.deliver(update.clone()).err())
                    .collect();
                Self::drop_failed(&mut state, failed);
                state.latest_snapshot = Some(snapshot);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Recomputes every aggregate from current gateway state.
    pub async fn compute_aggregates(&self) -> Result<AggregateSnapshot> {
        let snapshot = self.compute_snapshot().await?;
        self.state.lock().await.latest_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Sends a saga outcome to every observer. Failed outcomes are not
    /// published.
    pub async fn publish_outcome(&self, outcome: &SagaOutcome) {
        if !outcome.has_visible_effects() {
            return;
        }
        let message = Arc::new(HubMessage::SagaOutcome {
            outcome: outcome.clone(),
        });

        let mut state = self.state.lock().await;
        let failed = state
            .observers
            .values()
            .filter_map(|observer| observer.deliver(message.clone()).err())
            .collect();
        Self::drop_failed(&mut state, failed);
    }

    pub async fn observer_count(&self) -> usize {
        self.state.lock().await.observers.len()
    }

    /// The most recently computed snapshot, if any.
    pub async fn latest_snapshot(&self) -> Option<AggregateSnapshot> {
        self.state.lock().await.latest_snapshot.clone()
    }

    fn resolve_collections(&self, requested: Vec<String>) -> Result<BTreeSet<String>> {
        if requested.is_empty() {
            return Ok(self.config.collections.iter().cloned().collect());
        }
        requested
            .into_iter()
            .map(|c| {
                if self.config.collections.contains(&c) {
                    Ok(c)
                } else {
                    Err(HubError::UnknownCollection(c))
                }
            })
            .collect()
    }

    fn affects_aggregates(&self, collection: &str) -> bool {
        self.aggregators
            .iter()
            .any(|a| a.relevant_collections().contains(&collection))
    }

    async fn compute_snapshot(&self) -> Result<AggregateSnapshot> {
        let mut metrics = BTreeMap::new();
        for aggregator in &self.aggregators {
            metrics.extend(aggregator.compute().await?);
        }
        Ok(AggregateSnapshot::new(metrics))
    }

    fn drop_failed(state: &mut HubState, failed: Vec<DeliveryError>) {
        if failed.is_empty() {
            return;
        }
        for error in failed {
            let id = match error {
                DeliveryError::QueueFull(id) | DeliveryError::Disconnected(id) => id,
            };
            metrics::counter!("hub_delivery_failures_total").increment(1);
            tracing::warn!(observer_id = %id, %error, "dropping observer after failed delivery");
            state.observers.remove(&id);
        }
        metrics::gauge!("hub_observers").set(state.observers.len() as f64);
    }
}

#[async_trait]
impl<G> ChangeSink for FanoutHub<G>
where
    G: ResourceGateway + Clone + 'static,
{
    async fn on_change(&self, event: ChangeEvent) -> Result<()> {
        FanoutHub::on_change(self, event).await
    }
}

#[async_trait]
impl<G> OutcomePublisher for FanoutHub<G>
where
    G: ResourceGateway + Clone + 'static,
{
    async fn publish(&self, outcome: &SagaOutcome) {
        self.publish_outcome(outcome).await;
    }
}
