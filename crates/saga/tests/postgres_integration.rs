//! PostgreSQL integration tests for the saga store.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{OrderId, OrderStatus, SagaId, SagaStatus, UserId};
use saga::{PostgresSagaStore, SagaError, SagaRecord, SagaStore};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

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
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_states_table.sql"
            ))
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

async fn get_test_store() -> PostgresSagaStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_states")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

fn record(saga: &str) -> SagaRecord {
    SagaRecord::with_ids(
        SagaId::new(saga),
        OrderId::new(format!("order-{saga}")),
        UserId::new("user-1"),
    )
}

#[tokio::test]
#[serial]
async fn test_insert_and_load() {
    let store = get_test_store().await;
    store.insert(record("s1")).await.unwrap();

    let loaded = store.get(&SagaId::new("s1")).await.unwrap().unwrap();
    assert_eq!(loaded.status, SagaStatus::Started);
    assert_eq!(loaded.order_id, OrderId::new("order-s1"));

    let by_order = store
        .find_by_order(&UserId::new("user-1"), &OrderId::new("order-s1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_order.saga_id, SagaId::new("s1"));
    assert!(
        store
            .find_by_order(&UserId::new("user-2"), &OrderId::new("order-s1"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn test_duplicate_saga_rejected() {
    let store = get_test_store().await;
    store.insert(record("s1")).await.unwrap();

    let err = store.insert(record("s1")).await.unwrap_err();
    assert!(matches!(err, SagaError::DuplicateSaga(id) if id == SagaId::new("s1")));
}

#[tokio::test]
#[serial]
async fn test_transition_compare_and_set() {
    let store = get_test_store().await;
    store.insert(record("s1")).await.unwrap();
    let id = SagaId::new("s1");
    let created = store.get(&id).await.unwrap().unwrap();

    let moved = store
        .transition(&id, SagaStatus::Started, SagaStatus::InventoryReserved)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.status, SagaStatus::InventoryReserved);
    assert!(moved.updated_at >= created.updated_at);

    let lost = store
        .transition(&id, SagaStatus::Started, SagaStatus::Failed)
        .await
        .unwrap();
    assert!(lost.is_none());
    assert!(
        store
            .transition(&SagaId::new("ghost"), SagaStatus::Started, SagaStatus::Failed)
            .await
            .unwrap()
            .is_none()
    );

    let reserved = store
        .list_by_status(SagaStatus::InventoryReserved)
        .await
        .unwrap();
    assert_eq!(reserved.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_unrecognized_status_fails_open_for_order_status() {
    let store = get_test_store().await;
    store.insert(record("s1")).await.unwrap();
    sqlx::query("UPDATE saga_states SET status = 'ON_HOLD' WHERE saga_id = 's1'")
        .execute(store.pool())
        .await
        .unwrap();

    let err = store.get(&SagaId::new("s1")).await.unwrap_err();
    assert!(matches!(err, SagaError::UnrecognizedStatus { ref status, .. } if status == "ON_HOLD"));

    let name = store
        .status_name(&UserId::new("user-1"), &OrderId::new("order-s1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(OrderStatus::from_status_name(&name), OrderStatus::Pending);
}
