// Queue Data Model
//
// Every operation is a read-modify-write of a whole collection. None of them
// lock anything: they must run inside a granted transaction (see
// `QueueService`), which is also what makes their multi-step writes atomic
// from the outside.

use super::options::{DeployOptions, DequeueOptions, DEQUEUE_SETTLE_DELAY};
use super::storage::QueueStorage;
use crate::domain::{
    find_queue_index, DequeuePosition, DomainError, QueueFilter, QueueItem, QueueItemPatch,
    SavedQueue, SavedQueueKey, SavedQueuePatch, WindowId, WindowQueue,
};
use crate::error::{AppError, Result};
use crate::port::{Browser, ConfigProvider, CreateTab, KeyProvider, KeyValueStore, Tab, Window};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct QueueModel {
    storage: QueueStorage,
    browser: Arc<dyn Browser>,
    config: Arc<dyn ConfigProvider>,
    keys: Arc<dyn KeyProvider>,
}

impl QueueModel {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        browser: Arc<dyn Browser>,
        config: Arc<dyn ConfigProvider>,
        keys: Arc<dyn KeyProvider>,
    ) -> Self {
        Self {
            storage: QueueStorage::new(store),
            browser,
            config,
            keys,
        }
    }

    pub fn browser(&self) -> &Arc<dyn Browser> {
        &self.browser
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    pub async fn window_queues(&self) -> Result<Vec<WindowQueue>> {
        self.storage.window_queues().await
    }

    pub async fn saved_queues(&self) -> Result<Vec<SavedQueue>> {
        self.storage.saved_queues().await
    }

    pub async fn window_queue(&self, window_id: WindowId) -> Result<Option<WindowQueue>> {
        let queues = self.storage.window_queues().await?;
        Ok(queues.into_iter().find(|queue| queue.window_id == window_id))
    }

    /// Insert items into a window's queue (created on demand).
    ///
    /// Returns the number of items inserted after duplicate filtering.
    pub async fn enqueue(&self, window_id: WindowId, items: Vec<QueueItem>) -> Result<usize> {
        let config = self.config.load_window_config(window_id).await?;
        let mut queues = self.storage.window_queues().await?;

        let position = match find_queue_index(&queues, &QueueFilter::window(window_id)) {
            Some(position) => position,
            None => {
                queues.push(WindowQueue::new(window_id));
                queues.len() - 1
            }
        };
        let inserted = queues[position].push_items(
            items,
            config.position_to_enqueue,
            config.ignore_duplicates,
        );
        if queues[position].is_empty() {
            // Nothing made it in; a window queue never exists empty
            queues.remove(position);
        }

        self.storage.set_window_queues(&queues).await?;
        debug!(window_id, inserted, "Enqueued items");
        Ok(inserted)
    }

    /// Open the item at `index` as a new tab.
    ///
    /// The tab is created inactive; item removal and a short settle delay
    /// run together, and the requested active state is applied last.
    pub async fn dequeue(
        &self,
        window_id: WindowId,
        index: usize,
        options: DequeueOptions,
    ) -> Result<Tab> {
        let window = self
            .browser
            .get_window(window_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("window {} not found", window_id)))?;
        let tab_index = resolve_tab_index(&window, options.position);

        let queue = self
            .window_queue(window_id)
            .await?
            .ok_or_else(|| window_queue_not_found(window_id))?;
        let item = queue
            .items
            .get(index)
            .cloned()
            .ok_or(DomainError::ItemNotFound { window_id, index })?;

        let tab = self
            .browser
            .create_tab(CreateTab {
                window_id,
                index: tab_index,
                url: item.url,
                active: false,
                opener_tab_id: options.opener_tab_id,
            })
            .await?;

        let removal = async {
            if options.delete {
                self.remove_item(window_id, index).await?;
            }
            Ok::<_, AppError>(())
        };
        let ((), removed) = tokio::join!(tokio::time::sleep(DEQUEUE_SETTLE_DELAY), removal);
        removed?;

        let tab = self.browser.set_tab_active(tab.id, options.active).await?;
        debug!(window_id, index, tab_id = tab.id, "Dequeued item");
        Ok(tab)
    }

    /// Remove one item; an emptied window queue is deleted
    pub async fn remove_item(&self, window_id: WindowId, index: usize) -> Result<QueueItem> {
        let mut queues = self.storage.window_queues().await?;
        let position = find_queue_index(&queues, &QueueFilter::window(window_id))
            .ok_or_else(|| window_queue_not_found(window_id))?;

        let queue = &mut queues[position];
        if index >= queue.items.len() {
            return Err(DomainError::ItemNotFound { window_id, index }.into());
        }
        let removed = queue.items.remove(index);
        if queue.is_empty() {
            queues.remove(position);
        }

        self.storage.set_window_queues(&queues).await?;
        Ok(removed)
    }

    /// Merge `patch` into one item
    pub async fn set_item_properties(
        &self,
        window_id: WindowId,
        index: usize,
        patch: &QueueItemPatch,
    ) -> Result<QueueItem> {
        let mut queues = self.storage.window_queues().await?;
        let position = find_queue_index(&queues, &QueueFilter::window(window_id))
            .ok_or_else(|| window_queue_not_found(window_id))?;

        let item = queues[position]
            .items
            .get_mut(index)
            .ok_or(DomainError::ItemNotFound { window_id, index })?;
        patch.apply(item);
        let updated = item.clone();

        self.storage.set_window_queues(&queues).await?;
        Ok(updated)
    }

    /// Move a window's queue into a new saved queue.
    ///
    /// Returns the new key, or None when the window had no queue.
    pub async fn save_window_queue(&self, window_id: WindowId) -> Result<Option<SavedQueueKey>> {
        let mut window_queues = self.storage.window_queues().await?;
        let Some(position) = find_queue_index(&window_queues, &QueueFilter::window(window_id))
        else {
            return Ok(None);
        };
        let queue = window_queues.remove(position);

        let mut saved_queues = self.storage.saved_queues().await?;
        let key = if queue.is_empty() {
            None
        } else {
            let saved = SavedQueue::new(self.keys.generate_key(), queue.items);
            let key = saved.key.clone();
            saved_queues.push(saved);
            Some(key)
        };

        self.storage.set_all(&window_queues, &saved_queues).await?;
        info!(window_id, key = ?key, "Saved window queue");
        Ok(key)
    }

    /// Move every window queue into saved queues and clear the collection
    pub async fn save_all_window_queues(&self) -> Result<Vec<SavedQueueKey>> {
        let window_queues = self.storage.window_queues().await?;
        let mut saved_queues = self.storage.saved_queues().await?;

        let mut keys = Vec::new();
        for queue in window_queues.into_iter().filter(|queue| !queue.is_empty()) {
            let saved = SavedQueue::new(self.keys.generate_key(), queue.items);
            keys.push(saved.key.clone());
            saved_queues.push(saved);
        }

        self.storage.set_all(&[], &saved_queues).await?;
        info!(saved = keys.len(), "Saved all window queues");
        Ok(keys)
    }

    /// Append a saved queue's items to a window queue.
    ///
    /// With `options.delete`, the saved queue is removed afterwards unless
    /// it is locked.
    pub async fn deploy_saved_queue(
        &self,
        key: &str,
        window_id: WindowId,
        options: DeployOptions,
    ) -> Result<usize> {
        let saved_queues = self.storage.saved_queues().await?;
        let saved = saved_queues
            .into_iter()
            .find(|queue| queue.key == key)
            .ok_or_else(|| AppError::NotFound(format!("saved queue {} not found", key)))?;

        let inserted = self.enqueue(window_id, saved.items).await?;
        if options.delete && !saved.locked {
            self.remove_saved_queue(key).await?;
        }

        info!(key, window_id, inserted, "Deployed saved queue");
        Ok(inserted)
    }

    /// Returns false when no saved queue has this key
    pub async fn rename_saved_queue(&self, key: &str, name: &str) -> Result<bool> {
        let patch = SavedQueuePatch {
            name: Some(name.to_string()),
            locked: None,
        };
        self.set_saved_queue_properties(key, &patch).await
    }

    /// Returns false when no saved queue has this key
    pub async fn set_saved_queue_properties(
        &self,
        key: &str,
        patch: &SavedQueuePatch,
    ) -> Result<bool> {
        let mut queues = self.storage.saved_queues().await?;
        let Some(position) = find_queue_index(&queues, &QueueFilter::key(key)) else {
            return Ok(false);
        };
        patch.apply(&mut queues[position]);
        self.storage.set_saved_queues(&queues).await?;
        Ok(true)
    }

    /// Returns false when no saved queue has this key
    pub async fn remove_saved_queue(&self, key: &str) -> Result<bool> {
        let mut queues = self.storage.saved_queues().await?;
        let Some(position) = find_queue_index(&queues, &QueueFilter::key(key)) else {
            return Ok(false);
        };
        queues.remove(position);
        self.storage.set_saved_queues(&queues).await?;
        Ok(true)
    }
}

fn window_queue_not_found(window_id: WindowId) -> AppError {
    AppError::NotFound(format!("window queue {} not found", window_id))
}

/// Tab strip index for a dequeued tab
pub fn resolve_tab_index(window: &Window, position: DequeuePosition) -> usize {
    match position {
        DequeuePosition::Rightnext => window.active_tab().map_or(0, |tab| tab.index + 1),
        DequeuePosition::Rightmost | DequeuePosition::Unrecognized => window.tabs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnqueuePosition, QueueConfig};
    use crate::port::browser::memory::InMemoryBrowser;
    use crate::port::config_provider::StaticConfigProvider;
    use crate::port::key_provider::SequentialKeyProvider;
    use crate::port::store::memory::InMemoryStore;

    struct Fixture {
        model: QueueModel,
        browser: Arc<InMemoryBrowser>,
    }

    fn fixture(config: QueueConfig) -> Fixture {
        let browser = Arc::new(InMemoryBrowser::new());
        let model = QueueModel::new(
            Arc::new(InMemoryStore::new()),
            browser.clone(),
            Arc::new(StaticConfigProvider::new(config)),
            Arc::new(SequentialKeyProvider::new()),
        );
        Fixture { model, browser }
    }

    fn items(urls: &[&str]) -> Vec<QueueItem> {
        urls.iter().map(|url| QueueItem::new(*url)).collect()
    }

    async fn urls(model: &QueueModel, window_id: WindowId) -> Vec<String> {
        model
            .window_queue(window_id)
            .await
            .unwrap()
            .map(|queue| queue.items.into_iter().map(|item| item.url).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_enqueue_dedups_and_appends() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a", "b"])).await.unwrap();

        let inserted = f.model.enqueue(1, items(&["b", "c"])).await.unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(urls(&f.model, 1).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_enqueue_top_inserts_at_head() {
        let f = fixture(QueueConfig {
            position_to_enqueue: EnqueuePosition::Top,
            ..Default::default()
        });
        f.model.enqueue(1, items(&["a"])).await.unwrap();
        f.model.enqueue(1, items(&["b"])).await.unwrap();

        assert_eq!(urls(&f.model, 1).await, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_enqueue_nothing_creates_no_queue() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, Vec::new()).await.unwrap();

        assert!(f.model.window_queues().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_last_item_deletes_queue() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(3, items(&["a"])).await.unwrap();

        let removed = f.model.remove_item(3, 0).await.unwrap();

        assert_eq!(removed.url, "a");
        assert!(f.model.window_queue(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_not_found() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(3, items(&["a"])).await.unwrap();

        let err = f.model.remove_item(3, 5).await.unwrap_err();
        assert!(err.is_not_found());
        let err = f.model.remove_item(4, 0).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_item_properties_locks_item() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a", "b"])).await.unwrap();

        f.model
            .set_item_properties(1, 1, &QueueItemPatch::locked(true))
            .await
            .unwrap();

        let queue = f.model.window_queue(1).await.unwrap().unwrap();
        assert!(!queue.items[0].locked);
        assert!(queue.items[1].locked);
    }

    #[tokio::test]
    async fn test_dequeue_opens_tab_and_removes_item() {
        let f = fixture(QueueConfig::default());
        let window_id = f.browser.open_window().unwrap();
        f.browser.open_tab(window_id, "https://x", "x").unwrap();
        f.model.enqueue(window_id, items(&["a", "b"])).await.unwrap();

        let tab = f
            .model
            .dequeue(
                window_id,
                0,
                DequeueOptions {
                    active: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(tab.url, "a");
        assert_eq!(tab.index, 1);
        assert!(tab.active);
        assert_eq!(urls(&f.model, window_id).await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_dequeue_rightnext_lands_after_active_tab() {
        let f = fixture(QueueConfig::default());
        let window_id = f.browser.open_window().unwrap();
        let first = f.browser.open_tab(window_id, "https://1", "1").unwrap();
        f.browser.open_tab(window_id, "https://2", "2").unwrap();
        f.browser.set_tab_active(first.id, true).await.unwrap();
        f.model.enqueue(window_id, items(&["a"])).await.unwrap();

        let tab = f
            .model
            .dequeue(
                window_id,
                0,
                DequeueOptions {
                    position: DequeuePosition::Rightnext,
                    delete: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(tab.index, 1);
        assert!(!tab.active);
        assert_eq!(urls(&f.model, window_id).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_dequeue_missing_targets_fail() {
        let f = fixture(QueueConfig::default());
        let window_id = f.browser.open_window().unwrap();

        let err = f
            .model
            .dequeue(window_id + 100, 0, DequeueOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        f.model.enqueue(window_id, items(&["a"])).await.unwrap();
        let err = f
            .model
            .dequeue(window_id, 3, DequeueOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.browser.tab_count(window_id), 0);
    }

    #[tokio::test]
    async fn test_save_window_queue_moves_items() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a", "b"])).await.unwrap();

        let key = f.model.save_window_queue(1).await.unwrap().unwrap();

        assert!(f.model.window_queue(1).await.unwrap().is_none());
        let saved = f.model.saved_queues().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].key, key);
        assert_eq!(saved[0].name, key);
        assert_eq!(saved[0].items.len(), 2);
        assert_eq!(f.model.save_window_queue(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_all_clears_window_queues() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a"])).await.unwrap();
        f.model.enqueue(2, items(&["b"])).await.unwrap();

        let keys = f.model.save_all_window_queues().await.unwrap();

        assert_eq!(keys.len(), 2);
        assert!(f.model.window_queues().await.unwrap().is_empty());
        assert_eq!(f.model.saved_queues().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_unlocked_removes_saved_queue() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a", "b"])).await.unwrap();
        let key = f.model.save_window_queue(1).await.unwrap().unwrap();
        f.model.enqueue(5, items(&["z"])).await.unwrap();

        let inserted = f
            .model
            .deploy_saved_queue(&key, 5, DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(urls(&f.model, 5).await, vec!["z", "a", "b"]);
        assert!(f.model.saved_queues().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_locked_keeps_saved_queue() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a"])).await.unwrap();
        let key = f.model.save_window_queue(1).await.unwrap().unwrap();
        let lock = SavedQueuePatch {
            locked: Some(true),
            ..Default::default()
        };
        f.model.set_saved_queue_properties(&key, &lock).await.unwrap();

        f.model
            .deploy_saved_queue(&key, 5, DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(urls(&f.model, 5).await, vec!["a"]);
        assert_eq!(f.model.saved_queues().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_missing_key_is_not_found() {
        let f = fixture(QueueConfig::default());
        let err = f
            .model
            .deploy_saved_queue("nope", 1, DeployOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_saved_queue_mutations_ignore_missing_keys() {
        let f = fixture(QueueConfig::default());
        f.model.enqueue(1, items(&["a"])).await.unwrap();
        let key = f.model.save_window_queue(1).await.unwrap().unwrap();

        assert!(f.model.rename_saved_queue(&key, "reading").await.unwrap());
        assert!(!f.model.rename_saved_queue("nope", "x").await.unwrap());
        assert!(!f.model.remove_saved_queue("nope").await.unwrap());
        assert_eq!(f.model.saved_queues().await.unwrap()[0].name, "reading");

        assert!(f.model.remove_saved_queue(&key).await.unwrap());
        assert!(f.model.saved_queues().await.unwrap().is_empty());
    }
}
