//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use payments::SimulatedGateway;
use sqlx::postgres::PgPoolOptions;
use store::{CommerceStore, InMemoryStore, PostgresStore};
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Finishes interrupted work from a previous run, then serves until shutdown.
async fn run<S: CommerceStore>(
    store: S,
    gateway: SimulatedGateway,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(store, gateway));

    match state.payments.reconcile_paid_orders().await {
        Ok(repaired) => tracing::info!(repaired, "startup reconciliation finished"),
        Err(e) => tracing::warn!(error = %e, "startup reconciliation failed"),
    }

    let threshold = chrono::Duration::from_std(config.payment_stall_threshold)
        .unwrap_or_else(|_| chrono::Duration::minutes(5));
    match state.payments.recover_stalled(threshold).await {
        Ok(count) => tracing::info!(count, "re-driving stalled settlements"),
        Err(e) => tracing::warn!(error = %e, "stalled settlement recovery failed"),
    }

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build the settlement gateway
    let gateway = SimulatedGateway::new(
        config.payment_min_delay,
        config.payment_max_delay,
        config.payment_success_rate,
    );

    // 4. Pick the store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            run(store, gateway, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            run(InMemoryStore::new(), gateway, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
