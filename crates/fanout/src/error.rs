//! Fan-out error types.

use common::ObserverId;
use resource_gateway::GatewayError;
use thiserror::Error;

/// Errors that can occur in the hub or listener.
#[derive(Debug, Error)]
pub enum HubError {
    /// A subscription named a collection the hub does not watch.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// The gateway failed while computing a snapshot or reading the feed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// A message could not be enqueued for one observer. Never affects other
/// observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Observer {0} is not keeping up; its queue is full")]
    QueueFull(ObserverId),

    #[error("Observer {0} has disconnected")]
    Disconnected(ObserverId),
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
