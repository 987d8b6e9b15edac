use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::record::merge_patch;
use crate::{
    ChangeOperation, ChangeStream, GatewayError, NewRecord, RawChange, Record, RecordId, Result,
    ResourceGateway,
};

const FEED_CAPACITY: usize = 1024;

/// A failure the in-memory gateway can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fails with [`GatewayError::Unavailable`].
    Transient,
    /// Fails with [`GatewayError::Invalid`].
    Permanent,
    /// Never answers (sleeps for an hour), to exercise caller timeouts.
    Hang,
    /// Commits the write, then never answers: the caller times out on a
    /// write that did happen.
    HangAfterWrite,
}

#[derive(Debug, Clone, Copy)]
struct FaultPlan {
    fault: Fault,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, u64>,
    create_faults: HashMap<String, FaultPlan>,
    delete_faults: HashMap<String, FaultPlan>,
    reads_unavailable: bool,
}

enum FaultTarget {
    Create,
    Delete,
}

/// In-memory gateway implementation for testing and local runs.
///
/// Records live in per-collection vectors in insertion order. Every write
/// bumps the collection's sequence counter and is broadcast on the change
/// feed while the write lock is held, so feed order matches commit order.
#[derive(Clone)]
pub struct InMemoryResourceGateway {
    state: Arc<RwLock<MemoryState>>,
    feed: broadcast::Sender<RawChange>,
    native_sequences: bool,
}

impl InMemoryResourceGateway {
    /// Creates a new empty gateway.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            feed,
            native_sequences: true,
        }
    }

    /// Creates a gateway whose change feed carries no sequence numbers,
    /// like a store without a native per-collection counter.
    pub fn without_native_sequences() -> Self {
        Self {
            native_sequences: false,
            ..Self::new()
        }
    }

    /// Returns the number of records in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Returns the last sequence number assigned in a collection.
    pub async fn sequence(&self, collection: &str) -> u64 {
        self.state
            .read()
            .await
            .sequences
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every create in `collection` fail with `fault` until cleared.
    pub async fn inject_create_fault(&self, collection: &str, fault: Fault) {
        self.set_fault(FaultTarget::Create, collection, fault, None)
            .await;
    }

    /// Makes the next `times` deletes in `collection` fail with `fault`.
    pub async fn inject_delete_fault_times(&self, collection: &str, fault: Fault, times: u32) {
        self.set_fault(FaultTarget::Delete, collection, fault, Some(times))
            .await;
    }

    /// Makes every delete in `collection` fail with `fault` until cleared.
    pub async fn inject_delete_fault(&self, collection: &str, fault: Fault) {
        self.set_fault(FaultTarget::Delete, collection, fault, None)
            .await;
    }

    /// Makes every read fail with [`GatewayError::Unavailable`].
    pub async fn set_reads_unavailable(&self, unavailable: bool) {
        self.state.write().await.reads_unavailable = unavailable;
    }

    /// Removes all injected faults.
    pub async fn clear_faults(&self) {
        let mut state = self.state.write().await;
        state.create_faults.clear();
        state.delete_faults.clear();
        state.reads_unavailable = false;
    }

    async fn set_fault(
        &self,
        target: FaultTarget,
        collection: &str,
        fault: Fault,
        remaining: Option<u32>,
    ) {
        let mut state = self.state.write().await;
        let faults = match target {
            FaultTarget::Create => &mut state.create_faults,
            FaultTarget::Delete => &mut state.delete_faults,
        };
        faults.insert(collection.to_string(), FaultPlan { fault, remaining });
    }

    /// Fails the call if a fault is armed. Returns `true` when the write
    /// should go through and then hang.
    async fn trip_fault(&self, target: FaultTarget, collection: &str) -> Result<bool> {
        let fault = {
            let mut state = self.state.write().await;
            let faults = match target {
                FaultTarget::Create => &mut state.create_faults,
                FaultTarget::Delete => &mut state.delete_faults,
            };
            let plan = faults.get(collection).copied();
            if let Some(plan) = plan {
                match plan.remaining {
                    Some(n) if n <= 1 => {
                        faults.remove(collection);
                    }
                    Some(n) => {
                        faults.insert(
                            collection.to_string(),
                            FaultPlan {
                                remaining: Some(n - 1),
                                ..plan
                            },
                        );
                    }
                    None => {}
                }
            }
            plan.map(|p| p.fault)
        };

        match fault {
            None => Ok(false),
            Some(Fault::HangAfterWrite) => Ok(true),
            Some(Fault::Transient) => Err(GatewayError::Unavailable(format!(
                "injected transient failure in '{collection}'"
            ))),
            Some(Fault::Permanent) => Err(GatewayError::Invalid(format!(
                "injected permanent failure in '{collection}'"
            ))),
            Some(Fault::Hang) => Err(hang(collection).await),
        }
    }

    async fn check_reads(&self) -> Result<()> {
        if self.state.read().await.reads_unavailable {
            return Err(GatewayError::Unavailable(
                "injected read outage".to_string(),
            ));
        }
        Ok(())
    }

    fn emit(
        &self,
        state: &mut MemoryState,
        collection: &str,
        op: ChangeOperation,
        record: &Record,
    ) {
        let sequence = state.sequences.entry(collection.to_string()).or_insert(0);
        *sequence += 1;
        let change = RawChange {
            collection: collection.to_string(),
            operation: op,
            record: record.to_json(),
            occurred_at: record.updated_at,
            sequence: self.native_sequences.then_some(*sequence),
        };
        // No receivers is fine; nobody is listening yet.
        let _ = self.feed.send(change);
    }
}

async fn hang(collection: &str) -> GatewayError {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    GatewayError::Unavailable(format!("injected hang in '{collection}' elapsed"))
}

impl Default for InMemoryResourceGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceGateway for InMemoryResourceGateway {
    async fn create(&self, collection: &str, record: NewRecord) -> Result<Record> {
        let hang_after_write = self.trip_fault(FaultTarget::Create, collection).await?;

        let mut state = self.state.write().await;
        let rows = state.collections.entry(collection.to_string()).or_default();

        if let Some(key) = &record.natural_key
            && rows.iter().any(|r| r.natural_key.as_ref() == Some(key))
        {
            return Err(GatewayError::Conflict {
                collection: collection.to_string(),
                key: key.clone(),
            });
        }

        let id = record.id.unwrap_or_default();
        if rows.iter().any(|r| r.id == id) {
            return Err(GatewayError::Invalid(format!(
                "record {id} already exists in '{collection}'"
            )));
        }

        let now = Utc::now();
        let stored = Record {
            id,
            collection: collection.to_string(),
            natural_key: record.natural_key,
            data: record.data,
            created_at: now,
            updated_at: now,
        };
        rows.push(stored.clone());

        self.emit(&mut state, collection, ChangeOperation::Insert, &stored);
        drop(state);
        if hang_after_write {
            return Err(hang(collection).await);
        }
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: serde_json::Value,
    ) -> Result<Record> {
        let mut state = self.state.write().await;
        let record = state
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id,
            })?;

        merge_patch(&mut record.data, patch);
        record.updated_at = Utc::now();
        let updated = record.clone();

        self.emit(&mut state, collection, ChangeOperation::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        let hang_after_write = self.trip_fault(FaultTarget::Delete, collection).await?;

        let mut state = self.state.write().await;
        let rows = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        let index = rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        let mut removed = rows.remove(index);
        removed.updated_at = Utc::now();

        self.emit(&mut state, collection, ChangeOperation::Delete, &removed);
        drop(state);
        if hang_after_write {
            return Err(hang(collection).await);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>> {
        self.check_reads().await?;
        Ok(self
            .state
            .read()
            .await
            .collections
            .get(collection)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        self.check_reads().await?;
        Ok(self
            .state
            .read()
            .await
            .collections
            .get(collection)
            .and_then(|rows| rows.iter().find(|r| r.natural_key.as_deref() == Some(key)))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        self.check_reads().await?;
        Ok(self
            .state
            .read()
            .await
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent(&self, collection: &str, limit: usize) -> Result<Vec<Record>> {
        self.check_reads().await?;
        Ok(self
            .state
            .read()
            .await
            .collections
            .get(collection)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn changes(&self) -> Result<ChangeStream> {
        let stream = BroadcastStream::new(self.feed.subscribe()).map(|item| match item {
            Ok(change) => Ok(change),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Err(GatewayError::Unavailable(
                format!("change feed lagged, {missed} notifications dropped"),
            )),
        });
        Ok(Box::pin(stream))
    }
}
