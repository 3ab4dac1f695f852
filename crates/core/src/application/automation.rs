// Tab Automation
//
// Reacts to tab lifecycle events: keeps each window's tab count between the
// configured limits by storing surplus tabs and restoring queued ones.
// Every action reads live tab state and rewrites a queue, so each one runs
// inside its own transaction.

use crate::application::config::ConfigManager;
use crate::application::queues::{DequeueOptions, QueueModel, QueueService};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{QueueItem, SavedQueueKey, TargetTabToAutoStore, WindowId};
use crate::error::{AppError, Result};
use crate::port::{BrowserEvent, Tab, TabId, TabStatus};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct TabAutomation {
    queues: QueueService,
    config: ConfigManager,
}

impl TabAutomation {
    pub fn new(queues: QueueService, config: ConfigManager) -> Self {
        Self { queues, config }
    }

    /// Store one surplus tab when the window exceeds its upper limit.
    ///
    /// Returns the stored tab's id, if any tab was eligible.
    pub async fn auto_store(&self, window_id: WindowId) -> Result<Option<TabId>> {
        self.queues
            .exclusive("auto_store", move |model| async move {
                let config = model.config().load_window_config(window_id).await?;
                if !config.upper_limit_available {
                    return Ok(None);
                }
                let Some(window) = model.browser().get_window(window_id).await? else {
                    return Ok(None);
                };
                if window.tabs.len() <= config.upper_limit_value as usize {
                    return Ok(None);
                }

                let candidate = match config.target_tab_to_auto_store {
                    TargetTabToAutoStore::Latest => window.tabs.iter().max_by_key(|tab| tab.id),
                    TargetTabToAutoStore::Rightmost => {
                        window.tabs.iter().max_by_key(|tab| tab.index)
                    }
                };
                let Some(tab) = candidate else {
                    return Ok(None);
                };

                if config.ignore_loading_tabs && tab.status == TabStatus::Loading {
                    debug!(window_id, tab_id = tab.id, "Auto store skipped loading tab");
                    return Ok(None);
                }
                if tab.is_internal() {
                    debug!(window_id, tab_id = tab.id, "Auto store skipped internal tab");
                    return Ok(None);
                }
                if config.ignore_active_tabs && tab.active {
                    debug!(window_id, tab_id = tab.id, "Auto store skipped active tab");
                    return Ok(None);
                }

                store_tab(&model, tab, true).await?;
                info!(window_id, tab_id = tab.id, "Stored surplus tab");
                Ok(Some(tab.id))
            })
            .await
    }

    /// Open the first unlocked item when the window falls below its lower limit
    pub async fn auto_restore(&self, window_id: WindowId) -> Result<Option<Tab>> {
        self.queues
            .exclusive("auto_restore", move |model| async move {
                let config = model.config().load_window_config(window_id).await?;
                if !config.lower_limit_available {
                    return Ok(None);
                }
                let Some(window) = model.browser().get_window(window_id).await? else {
                    return Ok(None);
                };
                if window.tabs.len() >= config.lower_limit_value as usize {
                    return Ok(None);
                }
                let Some(index) = model
                    .window_queue(window_id)
                    .await?
                    .and_then(|queue| queue.first_unlocked_index())
                else {
                    return Ok(None);
                };

                let options = DequeueOptions {
                    active: false,
                    position: config.auto_restore_position(),
                    ..Default::default()
                };
                let tab = model.dequeue(window_id, index, options).await?;
                info!(window_id, tab_id = tab.id, "Restored queued tab");
                Ok(Some(tab))
            })
            .await
    }

    /// Queue one tab, closing it when the window is configured to
    pub async fn send_tab(&self, tab_id: TabId) -> Result<()> {
        self.queues
            .exclusive("send_tab", move |model| async move {
                let tab = model
                    .browser()
                    .get_all_windows()
                    .await?
                    .into_iter()
                    .flat_map(|window| window.tabs)
                    .find(|tab| tab.id == tab_id)
                    .ok_or_else(|| AppError::NotFound(format!("tab {} not found", tab_id)))?;
                let config = model.config().load_window_config(tab.window_id).await?;
                store_tab(&model, &tab, config.tab_closing_after_send).await
            })
            .await
    }

    /// Queue a link without opening it
    pub async fn send_link(&self, window_id: WindowId, url: &str, title: &str) -> Result<usize> {
        let item = QueueItem::new(url).with_title(title);
        self.queues.enqueue(window_id, vec![item]).await
    }

    /// Queue every tab of a window, then close the window
    pub async fn send_window(&self, window_id: WindowId) -> Result<usize> {
        self.queues
            .exclusive("send_window", move |model| async move {
                let window = model
                    .browser()
                    .get_window(window_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("window {} not found", window_id)))?;
                let items = window.tabs.iter().map(queue_item).collect();
                let inserted = model.enqueue(window_id, items).await?;
                model.browser().remove_window(window_id).await?;
                info!(window_id, inserted, "Sent window to queue");
                Ok(inserted)
            })
            .await
    }

    /// Process start: window ids from the previous session are stale
    pub async fn on_startup(&self) -> Result<Vec<SavedQueueKey>> {
        self.config.clear_window_configs().await?;
        let keys = self.queues.save_all_window_queues().await?;
        info!(saved = keys.len(), "Startup: window queues moved to saved queues");
        Ok(keys)
    }

    pub async fn on_window_removed(&self, window_id: WindowId) -> Result<Option<SavedQueueKey>> {
        self.config.remove_window_config(window_id).await?;
        self.queues.save_window_queue(window_id).await
    }

    async fn dispatch(&self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::TabCreated { tab } => {
                self.auto_store(tab.window_id).await?;
            }
            BrowserEvent::TabRemoved {
                window_id,
                is_window_closing: false,
                ..
            } => {
                self.auto_restore(window_id).await?;
            }
            BrowserEvent::WindowRemoved { window_id } => {
                self.on_window_removed(window_id).await?;
            }
            BrowserEvent::TabRemoved { .. }
            | BrowserEvent::TabUpdated { .. }
            | BrowserEvent::TabAttached { .. } => {}
        }
        Ok(())
    }

    /// Handle lifecycle events until shutdown or until the browser goes away
    pub async fn run(
        self,
        mut events: broadcast::Receiver<BrowserEvent>,
        mut shutdown: ShutdownToken,
    ) {
        info!("Tab automation started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.dispatch(event).await {
                            warn!(error = %e, "Tab automation action failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tab automation lagged behind browser events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("Tab automation stopped");
    }
}

fn queue_item(tab: &Tab) -> QueueItem {
    QueueItem::new(tab.url.clone())
        .with_title(tab.title.clone())
        .with_fav_icon_url(tab.fav_icon_url.clone().unwrap_or_default())
}

async fn store_tab(model: &QueueModel, tab: &Tab, close: bool) -> Result<()> {
    model.enqueue(tab.window_id, vec![queue_item(tab)]).await?;
    if close {
        model.browser().remove_tab(tab.id).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::{shutdown_channel, ShutdownSender};
    use crate::application::transaction::{spawn_coordinator, TransactionClient};
    use crate::domain::ConfigOverrides;
    use crate::port::browser::memory::InMemoryBrowser;
    use crate::port::key_provider::SequentialKeyProvider;
    use crate::port::store::memory::InMemoryStore;
    use crate::port::{Browser, KeyValueStore};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        automation: TabAutomation,
        queues: QueueService,
        config: ConfigManager,
        browser: Arc<InMemoryBrowser>,
        _shutdown: ShutdownSender,
    }

    async fn fixture(overrides: ConfigOverrides) -> Fixture {
        let (sender, shutdown) = shutdown_channel();
        let (handle, _join) = spawn_coordinator(Duration::from_secs(30), shutdown);
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let browser = Arc::new(InMemoryBrowser::new());
        let config = ConfigManager::new(store.clone());
        config.save_shared_config(overrides).await.unwrap();

        let model = QueueModel::new(
            store.clone(),
            browser.clone(),
            Arc::new(config.clone()),
            Arc::new(SequentialKeyProvider::new()),
        );
        let queues = QueueService::new(TransactionClient::new(handle, store), model);
        Fixture {
            automation: TabAutomation::new(queues.clone(), config.clone()),
            queues,
            config,
            browser,
            _shutdown: sender,
        }
    }

    fn limits(upper: u32, lower: u32) -> ConfigOverrides {
        ConfigOverrides {
            upper_limit_value: Some(upper),
            lower_limit_value: Some(lower),
            ..Default::default()
        }
    }

    /// Window with `count` loaded tabs; the first one is active
    fn window_with_tabs(browser: &InMemoryBrowser, count: usize) -> (WindowId, Vec<Tab>) {
        let window_id = browser.open_window().unwrap();
        let tabs: Vec<Tab> = (0..count)
            .map(|n| {
                let tab = browser
                    .open_tab(window_id, format!("https://{}", n), format!("page {}", n))
                    .unwrap();
                browser.set_tab_status(tab.id, TabStatus::Complete).unwrap()
            })
            .collect();
        (window_id, tabs)
    }

    async fn activate(browser: &InMemoryBrowser, tab: &Tab) {
        browser.set_tab_active(tab.id, true).await.unwrap();
    }

    async fn queued_urls(queues: &QueueService, window_id: WindowId) -> Vec<String> {
        queues
            .window_queues()
            .await
            .unwrap()
            .into_iter()
            .filter(|queue| queue.window_id == window_id)
            .flat_map(|queue| queue.items.into_iter().map(|item| item.url))
            .collect()
    }

    #[tokio::test]
    async fn test_auto_store_takes_rightmost_tab() {
        let f = fixture(limits(2, 1)).await;
        let (window_id, tabs) = window_with_tabs(&f.browser, 3);
        activate(&f.browser, &tabs[0]).await;

        let stored = f.automation.auto_store(window_id).await.unwrap();

        assert_eq!(stored, Some(tabs[2].id));
        assert_eq!(f.browser.tab_count(window_id), 2);
        assert_eq!(queued_urls(&f.queues, window_id).await, vec!["https://2"]);
    }

    #[tokio::test]
    async fn test_auto_store_takes_latest_tab() {
        let f = fixture(ConfigOverrides {
            target_tab_to_auto_store: Some(TargetTabToAutoStore::Latest),
            ..limits(2, 1)
        })
        .await;
        let (window_id, tabs) = window_with_tabs(&f.browser, 3);
        activate(&f.browser, &tabs[0]).await;
        // Newest tab is no longer the rightmost one
        let moved = f.browser.open_window().unwrap();
        f.browser.move_tab(tabs[1].id, moved).unwrap();
        f.browser.move_tab(tabs[1].id, window_id).unwrap();

        let stored = f.automation.auto_store(window_id).await.unwrap();

        assert_eq!(stored, Some(tabs[2].id));
    }

    #[tokio::test]
    async fn test_auto_store_skips_ineligible_tabs() {
        let f = fixture(limits(2, 1)).await;
        let (window_id, _tabs) = window_with_tabs(&f.browser, 2);

        // Rightmost tab is still loading and active
        f.browser.open_tab(window_id, "https://new", "new").unwrap();
        let stored = f.automation.auto_store(window_id).await.unwrap();
        assert_eq!(stored, None);

        // Internal page
        let internal = f.browser.open_tab(window_id, "chrome://settings", "s").unwrap();
        f.browser.set_tab_status(internal.id, TabStatus::Complete).unwrap();
        let first = f.browser.get_window(window_id).await.unwrap().unwrap().tabs[0].clone();
        activate(&f.browser, &first).await;
        let stored = f.automation.auto_store(window_id).await.unwrap();
        assert_eq!(stored, None);
        assert_eq!(f.browser.tab_count(window_id), 4);
    }

    #[tokio::test]
    async fn test_auto_store_respects_disabled_limit() {
        let f = fixture(ConfigOverrides {
            upper_limit_available: Some(false),
            ..limits(1, 0)
        })
        .await;
        let (window_id, tabs) = window_with_tabs(&f.browser, 3);
        activate(&f.browser, &tabs[0]).await;

        assert_eq!(f.automation.auto_store(window_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_auto_restore_skips_locked_items() {
        let f = fixture(limits(10, 3)).await;
        let (window_id, _tabs) = window_with_tabs(&f.browser, 1);
        f.queues
            .enqueue(
                window_id,
                vec![QueueItem::new("https://locked"), QueueItem::new("https://free")],
            )
            .await
            .unwrap();
        f.queues
            .set_item_properties(window_id, 0, crate::domain::QueueItemPatch::locked(true))
            .await
            .unwrap();

        let tab = f.automation.auto_restore(window_id).await.unwrap().unwrap();

        assert_eq!(tab.url, "https://free");
        assert!(!tab.active);
        assert_eq!(queued_urls(&f.queues, window_id).await, vec!["https://locked"]);
    }

    #[tokio::test]
    async fn test_auto_restore_noop_at_or_above_limit() {
        let f = fixture(limits(10, 1)).await;
        let (window_id, _tabs) = window_with_tabs(&f.browser, 1);
        f.queues
            .enqueue(window_id, vec![QueueItem::new("https://a")])
            .await
            .unwrap();

        assert!(f.automation.auto_restore(window_id).await.unwrap().is_none());
        assert_eq!(queued_urls(&f.queues, window_id).await, vec!["https://a"]);
    }

    #[tokio::test]
    async fn test_send_tab_closes_per_config() {
        let f = fixture(ConfigOverrides::default()).await;
        let (window_id, tabs) = window_with_tabs(&f.browser, 2);

        f.automation.send_tab(tabs[1].id).await.unwrap();

        assert_eq!(f.browser.tab_count(window_id), 1);
        let queues = f.queues.window_queues().await.unwrap();
        assert_eq!(queues[0].items[0].title, "page 1");

        let err = f.automation.send_tab(999).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_send_window_queues_every_tab_and_closes() {
        let f = fixture(ConfigOverrides::default()).await;
        let (window_id, _tabs) = window_with_tabs(&f.browser, 3);

        let inserted = f.automation.send_window(window_id).await.unwrap();

        assert_eq!(inserted, 3);
        assert!(f.browser.get_window(window_id).await.unwrap().is_none());
        assert_eq!(queued_urls(&f.queues, window_id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_startup_saves_everything_and_forgets_windows() {
        let f = fixture(ConfigOverrides::default()).await;
        f.config
            .save_window_config(1, limits(20, 2))
            .await
            .unwrap();
        f.automation.send_link(1, "https://a", "a").await.unwrap();
        f.automation.send_link(2, "https://b", "b").await.unwrap();

        let keys = f.automation.on_startup().await.unwrap();

        assert_eq!(keys.len(), 2);
        assert!(f.queues.window_queues().await.unwrap().is_empty());
        assert!(f.config.window_overrides(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_loop_saves_queue_of_closed_window() {
        let f = fixture(ConfigOverrides::default()).await;
        let (window_id, _tabs) = window_with_tabs(&f.browser, 1);
        f.automation
            .send_link(window_id, "https://later", "later")
            .await
            .unwrap();

        let (_sender, shutdown) = shutdown_channel();
        let events = f.browser.subscribe();
        tokio::spawn(f.automation.clone().run(events, shutdown));
        f.browser.remove_window(window_id).await.unwrap();

        let mut saved = Vec::new();
        for _ in 0..50 {
            saved = f.queues.saved_queues().await.unwrap();
            if !saved.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].items[0].url, "https://later");
    }
}
