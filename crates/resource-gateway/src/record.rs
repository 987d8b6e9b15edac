use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RecordId;

/// A record as persisted in one collection of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within the collection.
    pub id: RecordId,

    /// The collection (table) this record lives in.
    pub collection: String,

    /// Optional natural uniqueness key (e.g. an email address).
    pub natural_key: Option<String>,

    /// The record body.
    pub data: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Returns the record as a flat JSON object: the body plus `id`,
    /// `created_at` and `updated_at`.
    ///
    /// This is the shape carried by change events and snapshots.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = match &self.data {
            serde_json::Value::Object(map) => serde_json::Value::Object(map.clone()),
            other => serde_json::json!({ "data": other }),
        };
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("id".into(), serde_json::json!(self.id));
            map.insert("created_at".into(), serde_json::json!(self.created_at));
            map.insert("updated_at".into(), serde_json::json!(self.updated_at));
        }
        value
    }
}

/// Input for [`ResourceGateway::create`](crate::ResourceGateway::create).
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub id: Option<RecordId>,
    pub natural_key: Option<String>,
    pub data: serde_json::Value,
}

impl NewRecord {
    /// Creates a record body with a gateway-assigned id and no natural key.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            id: None,
            natural_key: None,
            data,
        }
    }

    /// Uses a caller-chosen id instead of a generated one.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the natural uniqueness key for this record.
    pub fn with_natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }
}

/// Applies a shallow merge patch: object keys in `patch` overwrite keys in
/// `target`, a `null` value removes the key. Non-object patches replace the
/// whole body.
pub(crate) fn merge_patch(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(current), serde_json::Value::Object(changes)) => {
            for (key, value) in changes {
                if value.is_null() {
                    current.remove(&key);
                } else {
                    current.insert(key, value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
