//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::error::StartupError;
use api::{Backends, catalog};
use event_channel::InMemoryEventChannel;
use inventory::PostgresLedgerStore;
use notification::PostgresOrderRepository;
use saga::PostgresSagaStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Connects to PostgreSQL and applies migrations, or falls back to memory.
async fn backends(config: &Config) -> Result<Backends, StartupError> {
    let Some(url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, using in-memory stores");
        return Ok(Backends::in_memory());
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await?;
    let sagas = PostgresSagaStore::new(pool.clone());
    sagas.run_migrations().await?;
    tracing::info!("connected to PostgreSQL, migrations applied");

    Ok(Backends {
        sagas: Arc::new(sagas),
        stock: Arc::new(PostgresLedgerStore::new(pool.clone())),
        orders: Arc::new(PostgresOrderRepository::new(pool)),
    })
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Storage backends and catalogue
    let backends = backends(&config).await?;
    if let Some(path) = &config.catalog_path {
        catalog::seed_catalog(backends.stock.as_ref(), path).await?;
    }

    // 4. Start the services on the event channel
    let channel = InMemoryEventChannel::with_partitions(config.channel_partitions);
    let services = api::start_services(backends, channel).await;

    // 5. Build the application
    let app = api::create_app(services.state.clone(), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, partitions = config.channel_partitions, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Let in-flight saga events settle before the consumers stop.
    services.state.channel.wait_idle().await;
    drop(services);
    tracing::info!("server shut down gracefully");
    Ok(())
}
