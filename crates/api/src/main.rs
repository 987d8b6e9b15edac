//! API server entry point.

use std::sync::Arc;

use api::Config;
use resource_gateway::{InMemoryResourceGateway, PostgresResourceGateway, ResourceGateway};
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

/// Connects to PostgreSQL when `DATABASE_URL` is set, else runs in memory.
async fn build_gateway(config: &Config) -> Arc<dyn ResourceGateway> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory gateway");
        return Arc::new(InMemoryResourceGateway::new());
    };

    let gateway = PostgresResourceGateway::connect(url)
        .await
        .expect("failed to connect to PostgreSQL")
        .with_poll_interval(config.change_poll_interval);
    gateway
        .run_migrations()
        .await
        .expect("failed to run migrations");
    tracing::info!("connected to PostgreSQL");
    Arc::new(gateway)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create gateway, sagas and hub
    let gateway = build_gateway(&config).await;
    let state = api::create_default_state(gateway, &config);

    // 4. Start the change feed listener
    let listener_task = api::spawn_change_listener(&state);

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    listener_task.abort();
    tracing::info!("server shut down gracefully");
}
