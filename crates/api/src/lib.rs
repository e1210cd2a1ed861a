//! HTTP surface and in-process wiring for the order saga services.
//!
//! Provides REST endpoints for order submission, order status, availability
//! checks and saga inspection, with structured logging (tracing) and
//! Prometheus metrics. The ordering, inventory and notification services run
//! in one process and talk only through the event channel.

pub mod catalog;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_channel::{InMemoryEventChannel, Subscription};
use inventory::{AvailabilityChecker, InMemoryLedgerStore, LedgerStore, ReservationLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use notification::{InMemoryOrderRepository, OrderMaterializer, OrderRepository};
use saga::{InMemorySagaStore, SagaCoordinator, SagaStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Coordinator over whichever saga store and checker the process was started with.
pub type Coordinator =
    SagaCoordinator<Arc<dyn SagaStore>, Arc<dyn AvailabilityChecker>, InMemoryEventChannel>;

/// Materializer over whichever order repository the process was started with.
pub type Materializer = OrderMaterializer<Arc<dyn OrderRepository>, InMemoryEventChannel>;

/// Ledger over whichever ledger store the process was started with.
pub type Ledger = ReservationLedger<Arc<dyn LedgerStore>, InMemoryEventChannel>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub ledger: Arc<Ledger>,
    pub materializer: Arc<Materializer>,
    pub channel: InMemoryEventChannel,
}

/// The storage backends the services run on.
pub struct Backends {
    pub sagas: Arc<dyn SagaStore>,
    pub stock: Arc<dyn LedgerStore>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Backends {
    /// In-memory backends for tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            sagas: Arc::new(InMemorySagaStore::new()),
            stock: Arc::new(InMemoryLedgerStore::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
        }
    }
}

/// Running services: the shared state plus the live channel subscriptions.
///
/// Dropping this stops the consumers.
pub struct Services {
    pub state: Arc<AppState>,
    pub subscriptions: Vec<Subscription>,
}

/// Builds the three services over `backends` and subscribes them to `channel`.
pub async fn start_services(backends: Backends, channel: InMemoryEventChannel) -> Services {
    let ledger = Arc::new(ReservationLedger::new(backends.stock, channel.clone()));
    let availability: Arc<dyn AvailabilityChecker> = ledger.clone();
    let coordinator = Arc::new(SagaCoordinator::new(
        backends.sagas,
        availability,
        channel.clone(),
    ));
    let materializer = Arc::new(OrderMaterializer::new(backends.orders, channel.clone()));

    let subscriptions = vec![
        channel.subscribe(coordinator.clone()).await,
        channel.subscribe(ledger.clone()).await,
        channel.subscribe(materializer.clone()).await,
    ];

    let state = Arc::new(AppState {
        coordinator,
        ledger,
        materializer,
        channel,
    });
    Services {
        state,
        subscriptions,
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::submit))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{order_id}", get(routes::orders::get))
        .route("/orders/{order_id}/status", get(routes::orders::status))
        .route("/users/{user_id}/orders", get(routes::orders::list_for_user))
        .route("/availability", post(routes::availability::check))
        .route("/sagas/{saga_id}", get(routes::sagas::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
