//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::Backends;
use api::config::{Config, LogFormat, mask_url};
use event_bus::{AmqpConfig, AmqpEventBus, EventBus, InMemoryEventBus};
use hub::HubHandle;
use store::PostgresStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DB_MAX_CONNECTIONS: u32 = 10;
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

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
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Event bus
    let (bus, amqp): (Arc<dyn EventBus>, Option<Arc<AmqpEventBus>>) = match &config.mq_url {
        Some(url) => {
            tracing::info!(url = %mask_url(url), "connecting to message broker");
            let amqp = Arc::new(
                AmqpEventBus::connect(AmqpConfig::new(url.as_str()))
                    .await
                    .expect("failed to connect to message broker"),
            );
            (amqp.clone(), Some(amqp))
        }
        None => {
            tracing::warn!("MQ_URL not set, events stay inside this process");
            (Arc::new(InMemoryEventBus::new()), None)
        }
    };

    // 4. Repositories
    let backends = match &config.db_url {
        Some(url) => {
            tracing::info!(url = %mask_url(url), "connecting to database");
            let store = PostgresStore::connect(url, DB_MAX_CONNECTIONS)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            Backends::postgres(bus, store)
        }
        None => {
            tracing::warn!("DB_URL not set, state is kept in memory");
            Backends::in_memory(bus)
        }
    };

    // 5. Services and their queue bindings
    let (hub, _hub_task) = HubHandle::spawn(config.hub_client_buffer);
    let state = api::start(config.service, backends, hub)
        .await
        .expect("failed to start services");
    let app = api::create_app(&state, metrics_handle);

    // 6. Serve until a shutdown signal
    let addr = config.addr();
    tracing::info!(%addr, service = %config.service, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Let background publishes finish before the broker goes away
    if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, state.publisher.flush())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = state.publisher.pending(),
            "gave up waiting for background publishes"
        );
    }
    if let Some(amqp) = amqp
        && let Err(e) = amqp.close().await
    {
        tracing::warn!(error = %e, "failed to close broker connection");
    }

    tracing::info!("server shut down gracefully");
}
