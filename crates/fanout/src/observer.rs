//! Observers registered with the hub and the subscription handle given to
//! their transport.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::ObserverId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DeliveryError;
use crate::event::HubMessage;

/// Hub-side state of one connected observer. Never persisted.
#[derive(Debug)]
pub(crate) struct Observer {
    pub id: ObserverId,
    pub connected_at: DateTime<Utc>,
    pub collections: BTreeSet<String>,
    /// Highest sequence delivered per collection.
    pub last_delivered: HashMap<String, u64>,
    sender: mpsc::Sender<Arc<HubMessage>>,
}

impl Observer {
    pub fn new(
        collections: BTreeSet<String>,
        last_delivered: HashMap<String, u64>,
        sender: mpsc::Sender<Arc<HubMessage>>,
    ) -> Self {
        Self {
            id: ObserverId::new(),
            connected_at: Utc::now(),
            collections,
            last_delivered,
            sender,
        }
    }

    pub fn watches(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }

    /// Returns true if `sequence` in `collection` has not been delivered yet.
    pub fn is_new(&self, collection: &str, sequence: u64) -> bool {
        sequence > self.last_delivered.get(collection).copied().unwrap_or(0)
    }

    /// Enqueues without waiting.
    pub fn deliver(&self, message: Arc<HubMessage>) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            TrySendError::Closed(_) => DeliveryError::Disconnected(self.id),
        })
    }
}

/// The receiving end of a subscription. The first message is always the
/// initial snapshot.
#[derive(Debug)]
pub struct Subscription {
    pub observer_id: ObserverId,
    pub connected_at: DateTime<Utc>,
    pub collections: Vec<String>,
    receiver: mpsc::Receiver<Arc<HubMessage>>,
}

impl Subscription {
    pub(crate) fn new(observer: &Observer, receiver: mpsc::Receiver<Arc<HubMessage>>) -> Self {
        Self {
            observer_id: observer.id,
            connected_at: observer.connected_at,
            collections: observer.collections.iter().cloned().collect(),
            receiver,
        }
    }

    /// Waits for the next message. Returns `None` once the hub has dropped
    /// this observer.
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.receiver.try_recv().ok()
    }

    /// Drains every message currently queued.
    pub fn drain(&mut self) -> Vec<Arc<HubMessage>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
