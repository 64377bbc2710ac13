//! Poshan API Server Entry Point
//!
//! Loads configuration, picks the product store, spawns the background jobs
//! and serves until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use poshan_api::jobs::{product_purge_task, throttle_sweep_task, PurgeConfig, SweepConfig};
use poshan_api::telemetry::{init_tracing, TelemetryConfig};
use poshan_api::{
    create_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig,
    OpenFoodFactsClient, PgProductStore, StoreBackend, UpstreamConfig,
};
use poshan_core::{Clock, InMemoryProductStore, ProductSource, ProductStore, SystemClock};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(api_config.store_backend).await?;
    let upstream_config = UpstreamConfig::from_env();
    tracing::info!(base_url = %upstream_config.base_url, "Using upstream catalogue");
    let source: Arc<dyn ProductSource> = Arc::new(OpenFoodFactsClient::new(upstream_config)?);

    let state = AppState::new(
        api_config.clone(),
        auth_config,
        store.clone(),
        source,
        clock.clone(),
    )?;

    // Background jobs
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(throttle_sweep_task(
        state.throttles.all(),
        SweepConfig::from(&api_config),
        shutdown_rx.clone(),
    ));
    let purge = tokio::spawn(product_purge_task(
        store,
        clock,
        PurgeConfig::from(&api_config),
        shutdown_rx,
    ));

    let app = create_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Poshan API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    })
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    for job in [sweep.await.map(|_| ()), purge.await.map(|_| ())] {
        if let Err(e) = job {
            tracing::error!(error = %e, "Background job ended abnormally");
        }
    }

    tracing::info!("Poshan API server stopped");
    Ok(())
}

async fn open_store(backend: StoreBackend) -> ApiResult<Arc<dyn ProductStore>> {
    match backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory product store; records are lost on restart");
            Ok(Arc::new(InMemoryProductStore::new()))
        }
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env();
            tracing::info!(
                host = %db_config.host,
                dbname = %db_config.dbname,
                pool_size = db_config.max_size,
                "Using PostgreSQL product store"
            );
            let store = PgProductStore::from_config(&db_config)?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("POSHAN_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("POSHAN_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
