//! Transaction Properties
//!
//! Mutual exclusion, grant order, rollback and timeout eviction, exercised
//! through the queue service over the SQLite store.

mod common;

use async_trait::async_trait;
use common::{harness, sqlite_store};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabqueue_core::application::transaction::constants::TRANSACTION_CHANNEL_NAME;
use tabqueue_core::application::transaction::{Request, Response};
use tabqueue_core::application::{
    shutdown_channel, spawn_coordinator, DeployOptions, QueueModel, QueueService,
    TransactionClient, TransactionError,
};
use tabqueue_core::domain::QueueItem;
use tabqueue_core::error::{AppError, Result};
use tabqueue_core::port::key_provider::SequentialKeyProvider;
use tabqueue_core::port::{KeyValueStore, StoreChanges, StoreValues};
use tokio::sync::broadcast;

/// SQLite store that can be told to stall its next read
struct StallingStore {
    inner: Arc<dyn KeyValueStore>,
    delay: Duration,
    stall_next: AtomicBool,
}

#[async_trait]
impl KeyValueStore for StallingStore {
    async fn get(&self, defaults: StoreValues) -> Result<StoreValues> {
        if self.stall_next.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.get(defaults).await
    }

    async fn set(&self, values: StoreValues) -> Result<()> {
        self.inner.set(values).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChanges> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn test_callbacks_never_overlap() {
    let h = harness(Duration::from_secs(30)).await;
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for n in 0..8 {
        let queues = h.queues.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        handles.push(tokio::spawn(async move {
            queues
                .exclusive("overlap", move |model| async move {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    model
                        .enqueue(1, vec![QueueItem::new(format!("https://{}", n))])
                        .await?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    let queues = h.queues.window_queues().await.unwrap();
    assert_eq!(queues[0].items.len(), 8);
}

#[tokio::test]
async fn test_second_registration_waits_for_first_termination() {
    let h = harness(Duration::from_secs(30)).await;
    let mut first = h.coordinator.connect(TRANSACTION_CHANNEL_NAME);
    let mut second = h.coordinator.connect(TRANSACTION_CHANNEL_NAME);

    assert!(first.send(Request::Register));
    assert_eq!(
        first.recv().await,
        Some(Response::Granted { transaction_id: 1 })
    );
    assert!(second.send(Request::Register));

    // Not granted while the first transaction is active
    assert!(tokio::time::timeout(Duration::from_millis(50), second.recv())
        .await
        .is_err());

    first.send(Request::Terminate { transaction_id: 1 });
    assert_eq!(first.recv().await, Some(Response::TerminationAcknowledged));
    assert_eq!(
        second.recv().await,
        Some(Response::Granted { transaction_id: 2 })
    );
}

#[tokio::test]
async fn test_failed_callback_restores_both_collections() {
    let h = harness(Duration::from_secs(30)).await;
    h.queues
        .enqueue(1, vec![QueueItem::new("a"), QueueItem::new("b")])
        .await
        .unwrap();
    h.queues.save_window_queue(1).await.unwrap();
    h.queues.enqueue(2, vec![QueueItem::new("c")]).await.unwrap();

    let window_before = h.queues.window_queues().await.unwrap();
    let saved_before = h.queues.saved_queues().await.unwrap();

    let result: Result<()> = h
        .queues
        .exclusive("failing", |model| async move {
            model
                .deploy_saved_queue("saved-1", 3, DeployOptions::default())
                .await?;
            model.save_all_window_queues().await?;
            Err(AppError::Internal("late failure".into()))
        })
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert_eq!(h.queues.window_queues().await.unwrap(), window_before);
    assert_eq!(h.queues.saved_queues().await.unwrap(), saved_before);
}

#[tokio::test]
async fn test_stuck_holder_is_evicted_after_timeout() {
    let h = harness(Duration::from_millis(100)).await;
    let mut failures = h.coordinator.subscribe_failures();

    let mut stuck = h.coordinator.connect(TRANSACTION_CHANNEL_NAME);
    stuck.send(Request::Register);
    assert!(matches!(stuck.recv().await, Some(Response::Granted { .. })));

    // Queued behind the stuck holder until the coordinator evicts it
    let inserted = h
        .queues
        .enqueue(1, vec![QueueItem::new("after-timeout")])
        .await
        .unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(failures.recv().await.unwrap(), TransactionError::TimedOut(1));
    assert_eq!(stuck.recv().await, Some(Response::TerminationAcknowledged));
}

#[tokio::test]
async fn test_budget_overrun_rolls_back_and_releases() {
    let store = sqlite_store().await;
    let h = harness(Duration::from_secs(30)).await;
    let client = TransactionClient::new(h.coordinator.clone(), store.clone())
        .with_callback_budget(Duration::from_millis(50));
    let model = QueueModel::new(
        store,
        h.browser.clone(),
        Arc::new(h.config.clone()),
        Arc::new(SequentialKeyProvider::new()),
    );
    let queues = QueueService::new(client, model);

    let result: Result<()> = queues
        .exclusive("slow", |model| async move {
            model.enqueue(1, vec![QueueItem::new("a")]).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Transaction(TransactionError::BudgetExceeded(_)))
    ));
    assert!(queues.window_queues().await.unwrap().is_empty());

    // The grant was returned: the next transaction runs immediately
    assert_eq!(
        queues.enqueue(1, vec![QueueItem::new("b")]).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_operations_abort_after_coordinator_shutdown() {
    let store = sqlite_store().await;
    let (sender, token) = shutdown_channel();
    let (coordinator, join) = spawn_coordinator(Duration::from_secs(30), token);
    let h = harness(Duration::from_secs(30)).await;
    let model = QueueModel::new(
        store.clone(),
        h.browser.clone(),
        Arc::new(h.config.clone()),
        Arc::new(SequentialKeyProvider::new()),
    );
    let queues = QueueService::new(TransactionClient::new(coordinator, store), model);

    sender.shutdown();
    join.await.unwrap();

    let err = queues
        .enqueue(1, vec![QueueItem::new("a")])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Transaction(TransactionError::Aborted)
    ));
    assert!(queues.window_queues().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_snapshot_never_overlaps_next_holder() {
    // 200ms timeout leaves a 100ms budget, counted from the grant
    let h = harness(Duration::from_millis(200)).await;
    let store = Arc::new(StallingStore {
        inner: sqlite_store().await,
        delay: Duration::from_millis(150),
        stall_next: AtomicBool::new(false),
    });
    let model = QueueModel::new(
        store.clone(),
        h.browser.clone(),
        Arc::new(h.config.clone()),
        Arc::new(SequentialKeyProvider::new()),
    );
    let queues = QueueService::new(
        TransactionClient::new(h.coordinator.clone(), store.clone()),
        model,
    );
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    store.stall_next.store(true, Ordering::SeqCst);
    let slow = {
        let queues = queues.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        tokio::spawn(async move {
            queues
                .exclusive("slow", move |model| async move {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    model.enqueue(1, vec![QueueItem::new("a")]).await?;
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let next = {
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        queues
            .exclusive("next", move |model| async move {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                model.enqueue(2, vec![QueueItem::new("b")]).await?;
                inside.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
    };

    let slow: Result<()> = slow.await.unwrap();
    assert!(matches!(
        slow,
        Err(AppError::Transaction(TransactionError::BudgetExceeded(_)))
    ));
    next.unwrap();
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);

    // Nothing the slow transaction did survives, and nothing undid the next one
    let window_queues = queues.window_queues().await.unwrap();
    assert_eq!(window_queues.len(), 1);
    assert_eq!(window_queues[0].window_id, 2);
    assert_eq!(window_queues[0].items, vec![QueueItem::new("b")]);
}
