//! Events and messages that flow through the hub.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use resource_gateway::ChangeOperation;
use saga::SagaOutcome;
use serde::{Deserialize, Serialize};

/// A typed change, sequenced per collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub operation: ChangeOperation,
    /// The record after the change (before it, for deletes).
    pub record: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub sequence: u64,
}

/// A single dashboard metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(i64),
    Text(String),
}

impl MetricValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => Some(s),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Dashboard aggregates, always computed in full from current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub computed_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl AggregateSnapshot {
    pub fn new(metrics: BTreeMap<String, MetricValue>) -> Self {
        Self {
            computed_at: Utc::now(),
            metrics,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Returns a numeric metric, or 0 if it is absent or textual.
    pub fn number(&self, name: &str) -> i64 {
        self.get(name).and_then(MetricValue::as_i64).unwrap_or(0)
    }
}

/// Server-to-observer message, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HubMessage {
    /// Always the first message of a subscription.
    InitialSnapshot {
        snapshot: AggregateSnapshot,
        /// Most recent records per subscribed collection, newest first.
        recent: BTreeMap<String, Vec<serde_json::Value>>,
        /// Last sequence reflected per subscribed collection. Live change
        /// events start right after it.
        watermarks: BTreeMap<String, u64>,
    },
    ChangeEvent {
        event: ChangeEvent,
    },
    AggregateUpdate {
        snapshot: AggregateSnapshot,
    },
    SagaOutcome {
        outcome: SagaOutcome,
    },
    Error {
        message: String,
    },
}

impl HubMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::InitialSnapshot { .. } => "initial-snapshot",
            HubMessage::ChangeEvent { .. } => "change-event",
            HubMessage::AggregateUpdate { .. } => "aggregate-update",
            HubMessage::SagaOutcome { .. } => "saga-outcome",
            HubMessage::Error { .. } => "error",
        }
    }
}

/// Observer-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Replaces the current subscription. An empty list means every
    /// watched collection.
    Subscribe {
        #[serde(default)]
        collections: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged_by_type() {
        let msg = HubMessage::AggregateUpdate {
            snapshot: AggregateSnapshot::new(BTreeMap::from([
                ("total_bookings".to_string(), MetricValue::from(3_i64)),
                ("latest_booking_at".to_string(), MetricValue::from(String::new())),
            ])),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "aggregate-update");
        assert_eq!(json["snapshot"]["metrics"]["total_bookings"], 3);
        assert_eq!(json["snapshot"]["metrics"]["latest_booking_at"], "");
        assert_eq!(msg.kind(), "aggregate-update");
    }

    #[test]
    fn test_change_event_message_shape() {
        let msg = HubMessage::ChangeEvent {
            event: ChangeEvent {
                collection: "guides".into(),
                operation: ChangeOperation::Delete,
                record: serde_json::json!({ "id": "x" }),
                occurred_at: Utc::now(),
                sequence: 7,
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "change-event");
        assert_eq!(json["event"]["operation"], "delete");
        assert_eq!(json["event"]["sequence"], 7);
    }

    #[test]
    fn test_subscribe_parses_with_and_without_collections() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","collections":["guides"]}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                collections: vec!["guides".into()]
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"subscribe"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe { collections: vec![] });
    }

    #[test]
    fn test_snapshot_number_defaults_to_zero() {
        let snapshot = AggregateSnapshot::new(BTreeMap::new());
        assert_eq!(snapshot.number("missing"), 0);
    }
}
