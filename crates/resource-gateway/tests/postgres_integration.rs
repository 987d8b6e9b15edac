//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container. Each test works in its own
//! uniquely named collection, so they can run in parallel.
//!
//! ```bash
//! cargo test -p resource-gateway --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use resource_gateway::{
    ChangeOperation, GatewayError, NewRecord, PostgresResourceGateway, RecordId,
    ResourceGateway, ResourceGatewayExt,
};
use serde_json::json;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_resources.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_gateway() -> PostgresResourceGateway {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    PostgresResourceGateway::new(pool).with_poll_interval(Duration::from_millis(20))
}

fn unique_collection(prefix: &str) -> String {
    format!("{prefix}_{}", RecordId::new().as_uuid().simple())
}

#[tokio::test]
async fn create_and_get_record() {
    let gateway = get_test_gateway().await;
    let collection = unique_collection("guides");

    let created = gateway
        .create(&collection, NewRecord::new(json!({"full_name": "Ana"})))
        .await
        .unwrap();

    let loaded = gateway.require(&collection, created.id).await.unwrap();
    assert_eq!(loaded.data["full_name"], "Ana");
    assert_eq!(loaded.collection, collection);
}

#[tokio::test]
async fn natural_key_conflict_is_permanent() {
    let gateway = get_test_gateway().await;
    let collection = unique_collection("identities");

    gateway
        .create(
            &collection,
            NewRecord::new(json!({})).with_natural_key("ana@example.com"),
        )
        .await
        .unwrap();

    let err = gateway
        .create(
            &collection,
            NewRecord::new(json!({})).with_natural_key("ana@example.com"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Conflict { .. }));
    assert!(!err.is_transient());

    let found = gateway
        .find_by_key(&collection, "ana@example.com")
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn update_merges_and_delete_removes() {
    let gateway = get_test_gateway().await;
    let collection = unique_collection("verifications");

    let record = gateway
        .create(
            &collection,
            NewRecord::new(json!({"status": "pending", "document_type": "passport"})),
        )
        .await
        .unwrap();

    let updated = gateway
        .update(&collection, record.id, json!({"status": "approved"}))
        .await
        .unwrap();
    assert_eq!(updated.data["status"], "approved");
    assert_eq!(updated.data["document_type"], "passport");

    gateway.delete(&collection, record.id).await.unwrap();
    assert!(!gateway.exists(&collection, record.id).await.unwrap());

    let err = gateway.delete(&collection, record.id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound { .. }));
}

#[tokio::test]
async fn recent_is_newest_first_and_limited() {
    let gateway = get_test_gateway().await;
    let collection = unique_collection("lodging");

    for n in 0..4 {
        gateway
            .create(&collection, NewRecord::new(json!({ "n": n })))
            .await
            .unwrap();
    }

    let recent = gateway.recent(&collection, 3).await.unwrap();
    let ns: Vec<_> = recent.iter().map(|r| r.data["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![3, 2, 1]);
    assert_eq!(gateway.list(&collection).await.unwrap().len(), 4);
}

#[tokio::test]
async fn change_feed_delivers_sequenced_changes() {
    let gateway = get_test_gateway().await;
    let collection = unique_collection("transport");

    let mut changes = gateway.changes().await.unwrap();

    let record = gateway
        .create(&collection, NewRecord::new(json!({"seat": 1})))
        .await
        .unwrap();
    gateway
        .update(&collection, record.id, json!({"seat": 2}))
        .await
        .unwrap();
    gateway.delete(&collection, record.id).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let change = tokio::time::timeout(Duration::from_secs(5), changes.next())
            .await
            .expect("change feed stalled")
            .unwrap()
            .unwrap();
        if change.collection == collection {
            seen.push(change);
        }
    }

    let ops: Vec<_> = seen.iter().map(|c| c.operation).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOperation::Insert,
            ChangeOperation::Update,
            ChangeOperation::Delete
        ]
    );
    let sequences: Vec<_> = seen.iter().map(|c| c.sequence.unwrap()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(seen[2].record["id"], json!(record.id));
}
