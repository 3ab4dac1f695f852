//! Shared wiring: every service over one in-memory SQLite store

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tabqueue_core::application::{
    shutdown_channel, spawn_coordinator, ConfigManager, CoordinatorHandle, QueueModel,
    QueueService, ShutdownSender, TabAutomation, TransactionClient,
};
use tabqueue_core::port::browser::memory::InMemoryBrowser;
use tabqueue_core::port::key_provider::SequentialKeyProvider;
use tabqueue_core::port::time_provider::FixedTimeProvider;
use tabqueue_core::port::KeyValueStore;
use tabqueue_infra_sqlite::{create_pool, run_migrations, SqliteKeyValueStore};

pub struct Harness {
    pub store: Arc<dyn KeyValueStore>,
    pub browser: Arc<InMemoryBrowser>,
    pub config: ConfigManager,
    pub coordinator: CoordinatorHandle,
    pub model: QueueModel,
    pub queues: QueueService,
    pub automation: TabAutomation,
    pub shutdown: ShutdownSender,
}

pub async fn sqlite_store() -> Arc<dyn KeyValueStore> {
    let pool = create_pool(":memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteKeyValueStore::new(
        pool,
        Arc::new(FixedTimeProvider::new(1_700_000_000_000)),
    ))
}

pub async fn harness(timeout: Duration) -> Harness {
    let store = sqlite_store().await;
    let browser = Arc::new(InMemoryBrowser::new());
    let config = ConfigManager::new(store.clone());

    let (shutdown, token) = shutdown_channel();
    let (coordinator, _join) = spawn_coordinator(timeout, token);

    let model = QueueModel::new(
        store.clone(),
        browser.clone(),
        Arc::new(config.clone()),
        Arc::new(SequentialKeyProvider::new()),
    );
    let queues = QueueService::new(
        TransactionClient::new(coordinator.clone(), store.clone()),
        model.clone(),
    );
    let automation = TabAutomation::new(queues.clone(), config.clone());

    Harness {
        store,
        browser,
        config,
        coordinator,
        model,
        queues,
        automation,
        shutdown,
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
