//! PostgreSQL integration tests for the ledger.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Discount, Money, OrderId, ProductId, SagaId};
use event_channel::ReservationLine;
use inventory::{
    LedgerStore, PostgresLedgerStore, ProductStock, ReservationFailure, ReservationStatus,
    ReserveOutcome,
};
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
                "../../../migrations/002_create_inventory_tables.sql"
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

async fn get_test_store() -> PostgresLedgerStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE reservations, products")
        .execute(&pool)
        .await
        .unwrap();

    let store = PostgresLedgerStore::new(pool);
    store
        .upsert_product(ProductStock::new(
            "a",
            "Apple",
            Money::from_cents(120),
            Discount::new(0.25).unwrap(),
            10,
        ))
        .await
        .unwrap();
    store
        .upsert_product(ProductStock::new(
            "b",
            "Banana",
            Money::from_cents(80),
            Discount::none(),
            2,
        ))
        .await
        .unwrap();
    store
}

async fn stock(store: &PostgresLedgerStore, id: &str) -> ProductStock {
    store
        .get_product(&ProductId::new(id))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn test_reserve_and_confirm() {
    let store = get_test_store().await;
    let saga = SagaId::new("s1");

    let outcome = store
        .reserve(&saga, &OrderId::new("o1"), &[ReservationLine::new("a", 3)])
        .await
        .unwrap();
    let ReserveOutcome::Reserved { lines, replayed } = outcome else {
        panic!("expected reservation");
    };
    assert!(!replayed);
    assert_eq!(lines[0].name, "Apple");
    assert_eq!(lines[0].discount, Discount::new(0.25).unwrap());
    assert_eq!(stock(&store, "a").await.available_quantity, 7);

    let confirmed = store.confirm(&saga).await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].status, ReservationStatus::Confirmed);

    let a = stock(&store, "a").await;
    assert_eq!(a.total_quantity, 7);
    assert_eq!(a.available_quantity, 7);
}

#[tokio::test]
#[serial]
async fn test_all_or_nothing_and_failure_reason() {
    let store = get_test_store().await;
    let outcome = store
        .reserve(
            &SagaId::new("s1"),
            &OrderId::new("o1"),
            &[ReservationLine::new("a", 1), ReservationLine::new("b", 5)],
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReserveOutcome::Rejected(ReservationFailure::InsufficientQuantity {
            product_id: ProductId::new("b"),
            requested: 5,
            available: 2,
        })
    );
    assert_eq!(stock(&store, "a").await.available_quantity, 10);
    assert!(
        store
            .reservations_for(&SagaId::new("s1"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[serial]
async fn test_replay_and_release() {
    let store = get_test_store().await;
    let saga = SagaId::new("s1");
    let lines = [ReservationLine::new("a", 6)];

    store.reserve(&saga, &OrderId::new("o1"), &lines).await.unwrap();
    let replay = store.reserve(&saga, &OrderId::new("o1"), &lines).await.unwrap();
    assert!(matches!(replay, ReserveOutcome::Reserved { replayed: true, .. }));
    assert_eq!(stock(&store, "a").await.available_quantity, 4);

    assert_eq!(store.release(&saga).await.unwrap().len(), 1);
    assert!(store.release(&saga).await.unwrap().is_empty());
    assert!(store.confirm(&saga).await.unwrap().is_empty());

    let a = stock(&store, "a").await;
    assert_eq!(a.available_quantity, 10);
    assert_eq!(a.total_quantity, 10);
}

#[tokio::test]
#[serial]
async fn test_concurrent_reserves_serialize_on_row_lock() {
    let store = get_test_store().await;
    store
        .upsert_product(ProductStock::new(
            "c",
            "Cherry",
            Money::from_cents(10),
            Discount::none(),
            5,
        ))
        .await
        .unwrap();

    let first = store.clone();
    let second = store.clone();
    let (saga_a, order_a, lines_a) = (
        SagaId::new("s-a"),
        OrderId::new("o-a"),
        [ReservationLine::new("c", 5)],
    );
    let (saga_b, order_b, lines_b) = (
        SagaId::new("s-b"),
        OrderId::new("o-b"),
        [ReservationLine::new("c", 5)],
    );
    let (a, b) = tokio::join!(
        first.reserve(&saga_a, &order_a, &lines_a),
        second.reserve(&saga_b, &order_b, &lines_b),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_reserved()).count(), 1);
    assert_eq!(stock(&store, "c").await.available_quantity, 0);
}

#[tokio::test]
#[serial]
async fn test_stock_levels_keep_request_order() {
    let store = get_test_store().await;
    let levels = store
        .stock_levels(&[
            ProductId::new("b"),
            ProductId::new("missing"),
            ProductId::new("a"),
        ])
        .await
        .unwrap();
    let ids: Vec<_> = levels.iter().map(|p| p.product_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(store.list_products().await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_reseed_keeps_holds_and_release_settles() {
    let store = get_test_store().await;
    let saga = SagaId::new("s1");
    store
        .reserve(&saga, &OrderId::new("o1"), &[ReservationLine::new("a", 3)])
        .await
        .unwrap();

    store
        .upsert_product(ProductStock::new(
            "a",
            "Apple",
            Money::from_cents(500),
            Discount::none(),
            10,
        ))
        .await
        .unwrap();
    let a = stock(&store, "a").await;
    assert_eq!(a.available_quantity, 7);
    assert_eq!(a.price, Money::from_cents(500));

    let other = store
        .reserve(
            &SagaId::new("s2"),
            &OrderId::new("o2"),
            &[ReservationLine::new("a", 10)],
        )
        .await
        .unwrap();
    assert!(!other.is_reserved());

    let ReserveOutcome::Reserved { lines, replayed } = store
        .reserve(&saga, &OrderId::new("o1"), &[ReservationLine::new("a", 3)])
        .await
        .unwrap()
    else {
        panic!("expected replayed reservation");
    };
    assert!(replayed);
    assert_eq!(lines[0].price, Money::from_cents(120));
    assert_eq!(lines[0].discount, Discount::new(0.25).unwrap());

    assert_eq!(store.release(&saga).await.unwrap().len(), 1);
    let a = stock(&store, "a").await;
    assert_eq!(a.available_quantity, 10);
    assert_eq!(a.total_quantity, 10);
}

#[tokio::test]
#[serial]
async fn test_reseed_below_held_is_refused() {
    let store = get_test_store().await;
    let saga = SagaId::new("s1");
    store
        .reserve(&saga, &OrderId::new("o1"), &[ReservationLine::new("b", 2)])
        .await
        .unwrap();

    let err = store
        .upsert_product(ProductStock::new(
            "b",
            "Banana",
            Money::from_cents(80),
            Discount::none(),
            1,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, inventory::LedgerError::InvalidStock { .. }));

    assert_eq!(store.confirm(&saga).await.unwrap().len(), 1);
    let b = stock(&store, "b").await;
    assert_eq!(b.total_quantity, 0);
    assert_eq!(b.available_quantity, 0);
}
