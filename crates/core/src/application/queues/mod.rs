// Queue Operations
//
// `QueueModel` holds the collection logic; `QueueService` is the only entry
// point for callers and runs every mutation inside its own transaction.

pub mod model;
pub mod options;
pub mod storage;

pub use model::{resolve_tab_index, QueueModel};
pub use options::{DeployOptions, DequeueOptions, DEQUEUE_SETTLE_DELAY};
pub use storage::QueueStorage;

use crate::application::transaction::{TransactionClient, TransactionError};
use crate::domain::{
    QueueItem, QueueItemPatch, SavedQueue, SavedQueueKey, SavedQueuePatch, WindowId,
    WindowQueue,
};
use crate::error::Result;
use crate::port::Tab;
use std::future::Future;
use tracing::debug;

/// Transactional facade over `QueueModel`
#[derive(Clone)]
pub struct QueueService {
    client: TransactionClient,
    model: QueueModel,
}

impl QueueService {
    pub fn new(client: TransactionClient, model: QueueModel) -> Self {
        Self { client, model }
    }

    pub fn client(&self) -> &TransactionClient {
        &self.client
    }

    pub fn model(&self) -> &QueueModel {
        &self.model
    }

    /// Run `op` on the model inside one transaction
    pub async fn exclusive<F, Fut, T>(&self, name: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(QueueModel) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let model = self.model.clone();
        self.client
            .run_exclusive(move |transaction_id| {
                debug!(transaction_id, operation = name, "Queue operation granted");
                op(model)
            })
            .await?
            .ok_or_else(|| TransactionError::Aborted.into())
    }

    // Reads replace nothing, so they need no grant

    pub async fn window_queues(&self) -> Result<Vec<WindowQueue>> {
        self.model.window_queues().await
    }

    pub async fn saved_queues(&self) -> Result<Vec<SavedQueue>> {
        self.model.saved_queues().await
    }

    pub async fn enqueue(&self, window_id: WindowId, items: Vec<QueueItem>) -> Result<usize> {
        self.exclusive("enqueue", move |model| async move {
            model.enqueue(window_id, items).await
        })
        .await
    }

    pub async fn dequeue(
        &self,
        window_id: WindowId,
        index: usize,
        options: DequeueOptions,
    ) -> Result<Tab> {
        self.exclusive("dequeue", move |model| async move {
            model.dequeue(window_id, index, options).await
        })
        .await
    }

    pub async fn remove_item(&self, window_id: WindowId, index: usize) -> Result<QueueItem> {
        self.exclusive("remove_item", move |model| async move {
            model.remove_item(window_id, index).await
        })
        .await
    }

    pub async fn set_item_properties(
        &self,
        window_id: WindowId,
        index: usize,
        patch: QueueItemPatch,
    ) -> Result<QueueItem> {
        self.exclusive("set_item_properties", move |model| async move {
            model.set_item_properties(window_id, index, &patch).await
        })
        .await
    }

    pub async fn save_window_queue(&self, window_id: WindowId) -> Result<Option<SavedQueueKey>> {
        self.exclusive("save_window_queue", move |model| async move {
            model.save_window_queue(window_id).await
        })
        .await
    }

    pub async fn save_all_window_queues(&self) -> Result<Vec<SavedQueueKey>> {
        self.exclusive("save_all_window_queues", |model| async move {
            model.save_all_window_queues().await
        })
        .await
    }

    pub async fn deploy_saved_queue(
        &self,
        key: &str,
        window_id: WindowId,
        options: DeployOptions,
    ) -> Result<usize> {
        let key = key.to_string();
        self.exclusive("deploy_saved_queue", move |model| async move {
            model.deploy_saved_queue(&key, window_id, options).await
        })
        .await
    }

    pub async fn rename_saved_queue(&self, key: &str, name: &str) -> Result<bool> {
        let (key, name) = (key.to_string(), name.to_string());
        self.exclusive("rename_saved_queue", move |model| async move {
            model.rename_saved_queue(&key, &name).await
        })
        .await
    }

    pub async fn set_saved_queue_properties(
        &self,
        key: &str,
        patch: SavedQueuePatch,
    ) -> Result<bool> {
        let key = key.to_string();
        self.exclusive("set_saved_queue_properties", move |model| async move {
            model.set_saved_queue_properties(&key, &patch).await
        })
        .await
    }

    pub async fn remove_saved_queue(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.exclusive("remove_saved_queue", move |model| async move {
            model.remove_saved_queue(&key).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::application::transaction::spawn_coordinator;
    use crate::domain::QueueConfig;
    use crate::error::AppError;
    use crate::port::browser::memory::InMemoryBrowser;
    use crate::port::config_provider::StaticConfigProvider;
    use crate::port::key_provider::SequentialKeyProvider;
    use crate::port::store::memory::InMemoryStore;
    use crate::port::KeyValueStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn service() -> (QueueService, crate::application::shutdown::ShutdownSender) {
        let (sender, shutdown) = shutdown_channel();
        let (handle, _join) = spawn_coordinator(Duration::from_secs(30), shutdown);
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let model = QueueModel::new(
            store.clone(),
            Arc::new(InMemoryBrowser::new()),
            Arc::new(StaticConfigProvider::new(QueueConfig::default())),
            Arc::new(SequentialKeyProvider::new()),
        );
        (
            QueueService::new(TransactionClient::new(handle, store), model),
            sender,
        )
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_are_all_applied() {
        let (service, _shutdown) = service();

        let mut handles = Vec::new();
        for n in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .enqueue(1, vec![QueueItem::new(format!("https://{}", n))])
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }

        let queues = service.window_queues().await.unwrap();
        assert_eq!(queues[0].items.len(), 10);
    }

    #[tokio::test]
    async fn test_failed_operation_leaves_collections_untouched() {
        let (service, _shutdown) = service();
        service
            .enqueue(1, vec![QueueItem::new("a")])
            .await
            .unwrap();

        let result: Result<()> = service
            .exclusive("failing", |model| async move {
                model.enqueue(1, vec![QueueItem::new("b")]).await?;
                model.save_all_window_queues().await?;
                Err(AppError::Internal("late failure".into()))
            })
            .await;

        assert!(result.is_err());
        let queues = service.window_queues().await.unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].items, vec![QueueItem::new("a")]);
        assert!(service.saved_queues().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_transaction_surfaces_as_error() {
        let (service, shutdown) = service();
        shutdown.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = service
            .enqueue(1, vec![QueueItem::new("a")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Transaction(TransactionError::Aborted)
        ));
    }
}
