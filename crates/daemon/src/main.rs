//! TabQueue Daemon - Main Entry Point
//!
//! Hosts the persistent store, the transaction coordinator, tab automation,
//! the queue reconciler and the JSON-RPC server in one process.

mod config;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use config::DaemonConfig;
use tabqueue_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use tabqueue_core::application::{
    shutdown_channel, spawn_coordinator, ConfigManager, QueueEvent, QueueModel, QueueService,
    Reconciler, TabAutomation, TransactionClient,
};
use tabqueue_core::port::browser::memory::InMemoryBrowser;
use tabqueue_core::port::key_provider::TimestampKeyProvider;
use tabqueue_core::port::time_provider::SystemTimeProvider;
use tabqueue_core::port::{Browser, KeyValueStore};
use tabqueue_infra_sqlite::{create_pool, run_migrations, SqliteKeyValueStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const EVENT_SINK_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_logging(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("tabqueue=info"))
        .context("Failed to create env filter")?;

    if json {
        // Production: JSON structured logging
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty formatting with colors
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env();
    init_logging(config.json_logs)?;

    info!("TabQueue daemon v{} starting...", VERSION);

    // 2. Initialize database
    if !config.db_path.contains(":memory:") {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
    }
    info!(db_path = %config.db_path, "Initializing database...");

    let pool = create_pool(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let store: Arc<dyn KeyValueStore> =
        Arc::new(SqliteKeyValueStore::new(pool.clone(), time_provider.clone()));
    let browser = Arc::new(InMemoryBrowser::new());
    let config_manager = ConfigManager::new(store.clone());

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let (coordinator, coordinator_task) =
        spawn_coordinator(config.transaction_timeout, shutdown_rx.clone());

    let mut failures = coordinator.subscribe_failures();
    tokio::spawn(async move {
        while let Ok(failure) = failures.recv().await {
            warn!(error = %failure, "Transaction evicted by coordinator");
        }
    });

    let model = QueueModel::new(
        store.clone(),
        browser.clone(),
        Arc::new(config_manager.clone()),
        Arc::new(TimestampKeyProvider::new(time_provider)),
    );
    let queues = QueueService::new(TransactionClient::new(coordinator, store.clone()), model);
    let automation = TabAutomation::new(queues.clone(), config_manager.clone());

    // 4. Startup policy: window ids from the previous session are stale
    match automation.on_startup().await {
        Ok(keys) => info!(saved = keys.len(), "Startup policy applied"),
        Err(e) => error!(error = %e, "Startup policy failed"),
    }

    // 5. Background loops
    let automation_task = tokio::spawn(
        automation
            .clone()
            .run(browser.subscribe(), shutdown_rx.clone()),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<QueueEvent>(EVENT_SINK_CAPACITY);
    let reconciler_task = tokio::spawn(
        Reconciler::new(store.as_ref()).run(event_tx, shutdown_rx.clone()),
    );
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                QueueEvent::WindowQueueChanged { window_id, .. } => {
                    info!(window_id, "Window queue changed");
                }
                QueueEvent::SavedQueueChanged { key, .. } => {
                    info!(key = %key, "Saved queue changed");
                }
            }
        }
    });

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let handler = RpcHandler::new(queues, config_manager, browser, automation);
    let rpc_handle = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;
    shutdown_tx.shutdown();
    for task in [automation_task, reconciler_task, coordinator_task] {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}
