//! Subscription service binary.
//!
//! Wires the Postgres store, the billing provider client and the Redis
//! event stream into the HTTP API and the event ingestion loop, then runs
//! both until SIGINT or SIGTERM.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use subscription_service::adapters::billing::HttpBillingGateway;
use subscription_service::adapters::events::{
    EventIngestionLoop, IdempotentHandler, RedisEventStream,
};
use subscription_service::adapters::http::{
    app_router, serve_with_ingestion, ServeError, SubscriptionAppState,
};
use subscription_service::adapters::postgres::PostgresSubscriptionStore;
use subscription_service::application::{
    PaymentEventApplier, RefundEventApplier, SubscriptionService,
};
use subscription_service::config::{AppConfig, ConfigError};
use subscription_service::domain::foundation::DomainError;
use subscription_service::ports::{GatewayError, StreamError, SubscriptionStore};

/// Failures that stop the process before or while serving.
#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Database: {0}")]
    Database(#[from] DomainError),

    #[error("Billing client: {0}")]
    Billing(#[from] GatewayError),

    #[error("Event stream: {0}")]
    Stream(#[from] StreamError),

    #[error("Server: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serve(#[from] ServeError),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate().map_err(ConfigError::from)?;

    init_tracing(&config);

    let store = PostgresSubscriptionStore::connect(&config.database).await?;
    if config.database.run_migrations {
        store.migrate().await?;
    }
    let store: Arc<dyn SubscriptionStore> = Arc::new(store);

    let gateway = Arc::new(HttpBillingGateway::new(&config.billing)?);
    let service = Arc::new(SubscriptionService::new(store.clone(), gateway));

    let payment_handler = Arc::new(IdempotentHandler::new(
        PaymentEventApplier::new(service.clone()),
        store.clone(),
    ));
    let refund_handler = Arc::new(IdempotentHandler::new(
        RefundEventApplier::new(service.clone()),
        store.clone(),
    ));

    let stream = RedisEventStream::connect(&config.stream).await?;
    let ingestion = EventIngestionLoop::new(Box::new(stream), payment_handler, refund_handler);

    let app = app_router(
        SubscriptionAppState::new(service),
        config.server.request_timeout(),
    );
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        "Subscription service listening"
    );

    let stats = serve_with_ingestion(listener, app, ingestion, shutdown_signal()).await?;
    tracing::info!(
        received = stats.received,
        processed = stats.processed,
        "Ingestion stopped"
    );
    tracing::info!("Subscription service stopped");
    Ok(())
}

/// Console logs in development, JSON lines in production. `RUST_LOG`
/// overrides the configured filter.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(true)).try_init().ok();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}
