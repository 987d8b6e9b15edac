use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::record::merge_patch;
use crate::{
    ChangeOperation, ChangeStream, GatewayError, NewRecord, RawChange, Record, RecordId, Result,
    ResourceGateway,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const POLL_BATCH_SIZE: i64 = 500;

/// PostgreSQL-backed gateway implementation.
///
/// Every write also appends a row to `change_log` inside the same
/// transaction; the change feed polls that table per collection.
#[derive(Clone)]
pub struct PostgresResourceGateway {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresResourceGateway {
    /// Creates a new PostgreSQL gateway.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Connects to the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    /// Sets how often the change feed polls for new changes.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<Record> {
        Ok(Record {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            collection: row.try_get("collection")?,
            natural_key: row.try_get("natural_key")?,
            data: row.try_get("data")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_change(row: PgRow) -> Result<RawChange> {
        let operation: String = row.try_get("operation")?;
        let sequence: i64 = row.try_get("sequence")?;
        Ok(RawChange {
            collection: row.try_get("collection")?,
            operation: operation.parse().map_err(GatewayError::Invalid)?,
            record: row.try_get("record")?,
            occurred_at: row.try_get("occurred_at")?,
            sequence: Some(sequence as u64),
        })
    }

    async fn append_change(
        tx: &mut Transaction<'_, Postgres>,
        operation: ChangeOperation,
        record: &Record,
    ) -> Result<()> {
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO collection_sequences (collection, last_sequence)
            VALUES ($1, 1)
            ON CONFLICT (collection)
            DO UPDATE SET last_sequence = collection_sequences.last_sequence + 1
            RETURNING last_sequence
            "#,
        )
        .bind(&record.collection)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO change_log (collection, sequence, operation, record, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.collection)
        .bind(sequence)
        .bind(operation.as_str())
        .bind(record.to_json())
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;

        metrics::counter!("gateway_writes_total", "operation" => operation.as_str()).increment(1);
        Ok(())
    }

    async fn current_sequences(pool: &PgPool) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT collection, last_sequence FROM collection_sequences")
            .fetch_all(pool)
            .await?;
        let mut sequences = HashMap::with_capacity(rows.len());
        for row in rows {
            let collection: String = row.try_get("collection")?;
            let last_sequence: i64 = row.try_get("last_sequence")?;
            sequences.insert(collection, last_sequence);
        }
        Ok(sequences)
    }
}

/// Cursor state of one change feed subscription.
struct ChangePoller {
    pool: PgPool,
    interval: Duration,
    cursors: HashMap<String, i64>,
    pending: VecDeque<RawChange>,
}

impl ChangePoller {
    async fn poll(&mut self) -> Result<()> {
        let heads = PostgresResourceGateway::current_sequences(&self.pool).await?;

        for (collection, head) in heads {
            let cursor = self.cursors.get(&collection).copied().unwrap_or(0);
            if head <= cursor {
                continue;
            }

            let rows = sqlx::query(
                r#"
                SELECT collection, sequence, operation, record, occurred_at
                FROM change_log
                WHERE collection = $1 AND sequence > $2
                ORDER BY sequence ASC
                LIMIT $3
                "#,
            )
            .bind(&collection)
            .bind(cursor)
            .bind(POLL_BATCH_SIZE)
            .fetch_all(&self.pool)
            .await?;

            metrics::counter!("gateway_changes_polled_total").increment(rows.len() as u64);
            for row in rows {
                let change = PostgresResourceGateway::row_to_change(row)?;
                if let Some(sequence) = change.sequence {
                    self.cursors.insert(collection.clone(), sequence as i64);
                }
                self.pending.push_back(change);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ResourceGateway for PostgresResourceGateway {
    async fn create(&self, collection: &str, record: NewRecord) -> Result<Record> {
        let id = record.id.unwrap_or_default();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO resources (collection, id, natural_key, data)
            VALUES ($1, $2, $3, $4)
            RETURNING collection, id, natural_key, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id.as_uuid())
        .bind(&record.natural_key)
        .bind(&record.data)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("unique_collection_natural_key") => {
                        return GatewayError::Conflict {
                            collection: collection.to_string(),
                            key: record.natural_key.clone().unwrap_or_default(),
                        };
                    }
                    Some("resources_pkey") => {
                        return GatewayError::Invalid(format!(
                            "record {id} already exists in '{collection}'"
                        ));
                    }
                    _ => {}
                }
            }
            GatewayError::Database(e)
        })?;
        let stored = Self::row_to_record(row)?;

        Self::append_change(&mut tx, ChangeOperation::Insert, &stored).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: serde_json::Value,
    ) -> Result<Record> {
        let mut tx = self.pool.begin().await?;

        let current: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT data FROM resources WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let mut data = current.ok_or_else(|| GatewayError::NotFound {
            collection: collection.to_string(),
            id,
        })?;
        merge_patch(&mut data, patch);

        let row = sqlx::query(
            r#"
            UPDATE resources SET data = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING collection, id, natural_key, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id.as_uuid())
        .bind(&data)
        .fetch_one(&mut *tx)
        .await?;
        let updated = Self::row_to_record(row)?;

        Self::append_change(&mut tx, ChangeOperation::Update, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            DELETE FROM resources
            WHERE collection = $1 AND id = $2
            RETURNING collection, id, natural_key, data, created_at, NOW() AS updated_at
            "#,
        )
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| GatewayError::NotFound {
            collection: collection.to_string(),
            id,
        })?;
        let removed = Self::row_to_record(row)?;

        Self::append_change(&mut tx, ChangeOperation::Delete, &removed).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, natural_key, data, created_at, updated_at
            FROM resources
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_record).transpose()
    }

    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, natural_key, data, created_at, updated_at
            FROM resources
            WHERE collection = $1 AND natural_key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_record).transpose()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, natural_key, data, created_at, updated_at
            FROM resources
            WHERE collection = $1
            ORDER BY created_at ASC, insert_order ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn recent(&self, collection: &str, limit: usize) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, natural_key, data, created_at, updated_at
            FROM resources
            WHERE collection = $1
            ORDER BY created_at DESC, insert_order DESC
            LIMIT $2
            "#,
        )
        .bind(collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn changes(&self) -> Result<ChangeStream> {
        let poller = ChangePoller {
            pool: self.pool.clone(),
            interval: self.poll_interval,
            cursors: Self::current_sequences(&self.pool).await?,
            pending: VecDeque::new(),
        };

        let stream = futures_util::stream::unfold(poller, |mut poller| async move {
            loop {
                if let Some(change) = poller.pending.pop_front() {
                    return Some((Ok(change), poller));
                }
                tokio::time::sleep(poller.interval).await;
                if let Err(e) = poller.poll().await {
                    tracing::warn!(error = %e, "change feed poll failed");
                    return Some((Err(e), poller));
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
