use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The kind of write a change notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    /// Returns the operation name as stored in the change log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "insert" => Ok(ChangeOperation::Insert),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            other => Err(format!("unknown change operation '{other}'")),
        }
    }
}

/// A change notification as emitted by the store.
///
/// `sequence` is the store's monotonic per-collection counter. Stores that
/// cannot provide one leave it `None` and the consumer synthesizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub collection: String,
    pub operation: ChangeOperation,
    pub record: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub sequence: Option<u64>,
}

/// A stream of change notifications, delivered at least once.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<RawChange>> + Send>>;
