use std::net::SocketAddr;
use std::sync::Arc;

use storefront_payments::api::{self, AppState};
use storefront_payments::config::{AppConfig, LogFormat};
use storefront_payments::providers::registry::ProviderRegistry;
use storefront_payments::reconcile::orchestrator::ReconciliationService;
use storefront_payments::reconcile::verifier::PollingVerifier;
use storefront_payments::store;
use storefront_payments::store::intents::{PaymentIntentStore, PgPaymentIntentStore};
use storefront_payments::store::ledger::PgEventLedger;
use storefront_payments::store::orders::PgOrderStore;
use storefront_payments::store::payments::PgPaymentStore;
use storefront_payments::store::provider_configs::PgProviderConfigStore;
use storefront_payments::workers::intent_expiry::{IntentExpiryConfig, IntentExpiryWorker};

use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting storefront payments service"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = store::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            anyhow::anyhow!(e)
        })?;
    info!("✅ Database connection pool initialized");

    // Storage behind trait objects so the reconciliation core never touches
    // sqlx directly; tests substitute the in-memory implementations.
    let intents: Arc<dyn PaymentIntentStore> = Arc::new(PgPaymentIntentStore::new(db_pool.clone()));
    let ledger = Arc::new(PgEventLedger::new(db_pool.clone()));
    let orders = Arc::new(PgOrderStore::new(db_pool.clone()));
    let payments = Arc::new(PgPaymentStore::new(db_pool.clone()));
    let provider_configs = Arc::new(PgProviderConfigStore::new(db_pool.clone()));

    let registry = Arc::new(ProviderRegistry::new(
        provider_configs,
        config.provider_secrets.clone(),
    ));
    let reconciler = Arc::new(ReconciliationService::new(
        registry.clone(),
        ledger,
        intents.clone(),
        orders,
        payments,
    ));
    let verifier = Arc::new(PollingVerifier::new(registry, reconciler.clone()));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let expiry_enabled = std::env::var("INTENT_EXPIRY_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let mut expiry_handle = None;
    if expiry_enabled {
        let expiry_config = IntentExpiryConfig::from_env();
        info!(
            poll_interval_secs = expiry_config.poll_interval.as_secs(),
            pending_ttl_secs = expiry_config.pending_ttl.as_secs(),
            "Starting intent expiry worker"
        );
        let worker = IntentExpiryWorker::new(intents.clone(), expiry_config);
        expiry_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("Intent expiry worker disabled (INTENT_EXPIRY_ENABLED=false)");
    }

    let state = AppState {
        reconciler,
        verifier,
        intents,
        db_pool,
    };

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = expiry_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for expiry worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
