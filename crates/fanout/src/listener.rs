//! Change feed listener: turns the gateway's raw, at-least-once feed into
//! sequenced [`ChangeEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use resource_gateway::{RawChange, ResourceGateway};

use crate::Result;
use crate::event::ChangeEvent;

/// Consumer of sequenced change events.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn on_change(&self, event: ChangeEvent) -> Result<()>;
}

#[async_trait]
impl<T: ChangeSink + ?Sized> ChangeSink for Arc<T> {
    async fn on_change(&self, event: ChangeEvent) -> Result<()> {
        (**self).on_change(event).await
    }
}

/// Per-collection sequence bookkeeping.
///
/// The first change seen for a collection sets its baseline. After that a
/// sequence at or below the last one is a redelivery and is dropped, and a
/// jump of more than one is a gap. Changes without a native sequence are
/// numbered last + 1.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: HashMap<String, u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, collection: &str) -> Option<u64> {
        self.last.get(collection).copied()
    }

    /// Returns the sequenced event, or `None` for a redelivery.
    pub fn ingest(&mut self, raw: RawChange) -> Option<ChangeEvent> {
        let last = self.last(&raw.collection);
        let sequence = match (raw.sequence, last) {
            (None, last) => last.unwrap_or(0) + 1,
            (Some(sequence), None) => sequence,
            (Some(sequence), Some(last)) if sequence <= last => {
                tracing::debug!(
                    collection = %raw.collection,
                    sequence,
                    last,
                    "dropping redelivered change"
                );
                return None;
            }
            (Some(sequence), Some(last)) => {
                if sequence > last + 1 {
                    metrics::counter!("change_feed_sequence_gaps_total").increment(1);
                    tracing::error!(
                        collection = %raw.collection,
                        expected = last + 1,
                        received = sequence,
                        "sequence gap in change feed; changes may have been lost"
                    );
                }
                sequence
            }
        };
        self.last.insert(raw.collection.clone(), sequence);

        Some(ChangeEvent {
            collection: raw.collection,
            operation: raw.operation,
            record: raw.record,
            occurred_at: raw.occurred_at,
            sequence,
        })
    }
}

/// Pumps the gateway's change feed into a [`ChangeSink`].
pub struct ChangeFeedListener<G> {
    gateway: G,
    tracker: SequenceTracker,
}

impl<G: ResourceGateway> ChangeFeedListener<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            tracker: SequenceTracker::new(),
        }
    }

    /// Runs until the feed ends. Feed and sink errors are logged and the
    /// loop continues.
    #[tracing::instrument(skip(self, sink))]
    pub async fn run<S: ChangeSink>(mut self, sink: S) -> Result<()> {
        let mut stream = self.gateway.changes().await?;
        tracing::info!("change feed listener started");

        while let Some(item) = stream.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "change feed error");
                    continue;
                }
            };
            let Some(event) = self.tracker.ingest(raw) else {
                continue;
            };
            let (collection, sequence) = (event.collection.clone(), event.sequence);
            if let Err(e) = sink.on_change(event).await {
                tracing::error!(%collection, sequence, error = %e, "change delivery failed");
            }
        }

        tracing::info!("change feed ended");
        Ok(())
    }
}
