use async_trait::async_trait;

use crate::{ChangeStream, GatewayError, NewRecord, Record, RecordId, Result};

/// Core trait for resource gateway implementations.
///
/// Each method performs exactly one logical operation against the store.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Creates a record in `collection`.
    ///
    /// Fails with [`GatewayError::Conflict`] if `record.natural_key` is
    /// already taken in that collection.
    async fn create(&self, collection: &str, record: NewRecord) -> Result<Record>;

    /// Applies a shallow merge patch to an existing record.
    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: serde_json::Value,
    ) -> Result<Record>;

    /// Deletes a record. Fails with [`GatewayError::NotFound`] if absent.
    async fn delete(&self, collection: &str, id: RecordId) -> Result<()>;

    /// Loads a record by id.
    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>>;

    /// Loads a record by its natural key.
    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Record>>;

    /// Returns every record of a collection, oldest first.
    async fn list(&self, collection: &str) -> Result<Vec<Record>>;

    /// Returns the `limit` most recently created records, newest first.
    async fn recent(&self, collection: &str, limit: usize) -> Result<Vec<Record>>;

    /// Opens the change feed for all collections.
    async fn changes(&self) -> Result<ChangeStream>;
}

/// Extension trait providing convenience methods for gateways.
#[async_trait]
pub trait ResourceGatewayExt: ResourceGateway {
    /// Checks if a record exists.
    async fn exists(&self, collection: &str, id: RecordId) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Loads a record, failing with [`GatewayError::NotFound`] if absent.
    async fn require(&self, collection: &str, id: RecordId) -> Result<Record> {
        self.get(collection, id)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id,
            })
    }
}

impl<T: ResourceGateway + ?Sized> ResourceGatewayExt for T {}

#[async_trait]
impl<T: ResourceGateway + ?Sized> ResourceGateway for std::sync::Arc<T> {
    async fn create(&self, collection: &str, record: NewRecord) -> Result<Record> {
        (**self).create(collection, record).await
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: serde_json::Value,
    ) -> Result<Record> {
        (**self).update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        (**self).delete(collection, id).await
    }

    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>> {
        (**self).get(collection, id).await
    }

    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        (**self).find_by_key(collection, key).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        (**self).list(collection).await
    }

    async fn recent(&self, collection: &str, limit: usize) -> Result<Vec<Record>> {
        (**self).recent(collection, limit).await
    }

    async fn changes(&self) -> Result<ChangeStream> {
        (**self).changes().await
    }
}
