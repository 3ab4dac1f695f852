//! RPC Method Handlers
//!
//! Implements each JSON-RPC method on top of the application services.
//! Queue mutations go through `QueueService`/`TabAutomation`, which run
//! them inside a transaction; browser session calls drive the in-memory
//! session model and reach the automation through its lifecycle events.

use crate::error::to_rpc_error;
use crate::types::{
    AckResponse, CloseTabRequest, CloseWindowRequest, DeployRequest, DequeueRequest,
    EnqueueRequest, EnqueueResponse, GetConfigRequest, GetConfigResponse, ItemResponse,
    ListQueuesRequest, ListQueuesResponse, OpenTabRequest, OpenWindowRequest, OpenWindowResponse,
    RemoveItemRequest, RemoveSavedRequest, RenameSavedRequest, SaveAllRequest, SaveAllResponse,
    SaveWindowRequest, SaveWindowResponse, SavedQueueResponse, SendLinkRequest, SendTabRequest,
    SendWindowRequest, SetConfigResponse, SetItemRequest, SetSavedRequest,
    SetSharedConfigRequest, SetWindowConfigRequest, TabLoadedRequest, TabResponse,
    WindowsRequest, WindowsResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tabqueue_core::application::{ConfigManager, QueueService, TabAutomation};
use tabqueue_core::port::browser::memory::InMemoryBrowser;
use tabqueue_core::port::{Browser, TabStatus};
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    queues: QueueService,
    config: ConfigManager,
    browser: Arc<InMemoryBrowser>,
    automation: TabAutomation,
}

impl RpcHandler {
    pub fn new(
        queues: QueueService,
        config: ConfigManager,
        browser: Arc<InMemoryBrowser>,
        automation: TabAutomation,
    ) -> Self {
        Self {
            queues,
            config,
            browser,
            automation,
        }
    }

    // ------------------------------------------------------------------
    // queues.*
    // ------------------------------------------------------------------

    /// queues.list.v1
    pub async fn list_queues(&self, _params: ListQueuesRequest) -> RpcResult<ListQueuesResponse> {
        let window_queues = self.queues.window_queues().await.map_err(to_rpc_error)?;
        let saved_queues = self.queues.saved_queues().await.map_err(to_rpc_error)?;
        Ok(ListQueuesResponse {
            window_queues,
            saved_queues,
        })
    }

    /// queues.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> RpcResult<EnqueueResponse> {
        let inserted = self
            .queues
            .enqueue(params.window_id, params.items)
            .await
            .map_err(to_rpc_error)?;
        Ok(EnqueueResponse {
            window_id: params.window_id,
            inserted,
        })
    }

    /// queues.dequeue.v1
    pub async fn dequeue(&self, params: DequeueRequest) -> RpcResult<TabResponse> {
        let tab = self
            .queues
            .dequeue(params.window_id, params.index, params.options)
            .await
            .map_err(to_rpc_error)?;
        Ok(TabResponse { tab })
    }

    /// queues.remove_item.v1
    pub async fn remove_item(&self, params: RemoveItemRequest) -> RpcResult<ItemResponse> {
        let item = self
            .queues
            .remove_item(params.window_id, params.index)
            .await
            .map_err(to_rpc_error)?;
        Ok(ItemResponse {
            window_id: params.window_id,
            index: params.index,
            item,
        })
    }

    /// queues.set_item.v1
    pub async fn set_item(&self, params: SetItemRequest) -> RpcResult<ItemResponse> {
        let item = self
            .queues
            .set_item_properties(params.window_id, params.index, params.patch)
            .await
            .map_err(to_rpc_error)?;
        Ok(ItemResponse {
            window_id: params.window_id,
            index: params.index,
            item,
        })
    }

    /// queues.save_window.v1
    pub async fn save_window(&self, params: SaveWindowRequest) -> RpcResult<SaveWindowResponse> {
        let key = self
            .queues
            .save_window_queue(params.window_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(SaveWindowResponse {
            window_id: params.window_id,
            key,
        })
    }

    /// queues.save_all.v1
    pub async fn save_all(&self, _params: SaveAllRequest) -> RpcResult<SaveAllResponse> {
        let keys = self
            .queues
            .save_all_window_queues()
            .await
            .map_err(to_rpc_error)?;
        Ok(SaveAllResponse { keys })
    }

    // ------------------------------------------------------------------
    // saved.*
    // ------------------------------------------------------------------

    /// saved.deploy.v1
    pub async fn deploy(&self, params: DeployRequest) -> RpcResult<EnqueueResponse> {
        let inserted = self
            .queues
            .deploy_saved_queue(&params.key, params.window_id, params.options)
            .await
            .map_err(to_rpc_error)?;
        Ok(EnqueueResponse {
            window_id: params.window_id,
            inserted,
        })
    }

    /// saved.rename.v1
    pub async fn rename_saved(&self, params: RenameSavedRequest) -> RpcResult<SavedQueueResponse> {
        let changed = self
            .queues
            .rename_saved_queue(&params.key, &params.name)
            .await
            .map_err(to_rpc_error)?;
        Ok(SavedQueueResponse {
            key: params.key,
            changed,
        })
    }

    /// saved.set.v1
    pub async fn set_saved(&self, params: SetSavedRequest) -> RpcResult<SavedQueueResponse> {
        let changed = self
            .queues
            .set_saved_queue_properties(&params.key, params.patch)
            .await
            .map_err(to_rpc_error)?;
        Ok(SavedQueueResponse {
            key: params.key,
            changed,
        })
    }

    /// saved.remove.v1
    pub async fn remove_saved(&self, params: RemoveSavedRequest) -> RpcResult<SavedQueueResponse> {
        let changed = self
            .queues
            .remove_saved_queue(&params.key)
            .await
            .map_err(to_rpc_error)?;
        Ok(SavedQueueResponse {
            key: params.key,
            changed,
        })
    }

    // ------------------------------------------------------------------
    // config.*
    // ------------------------------------------------------------------

    /// config.get.v1
    pub async fn get_config(&self, params: GetConfigRequest) -> RpcResult<GetConfigResponse> {
        let shared = self.config.shared_overrides().await.map_err(to_rpc_error)?;
        let (window, effective) = match params.window_id {
            Some(window_id) => (
                self.config
                    .window_overrides(window_id)
                    .await
                    .map_err(to_rpc_error)?,
                self.config
                    .load_window_config(window_id)
                    .await
                    .map_err(to_rpc_error)?,
            ),
            None => (
                None,
                self.config.load_shared_config().await.map_err(to_rpc_error)?,
            ),
        };
        Ok(GetConfigResponse {
            shared,
            window,
            effective,
        })
    }

    /// config.set_shared.v1
    pub async fn set_shared_config(
        &self,
        params: SetSharedConfigRequest,
    ) -> RpcResult<SetConfigResponse> {
        self.config
            .save_shared_config(params.config)
            .await
            .map_err(to_rpc_error)?;
        let effective = self.config.load_shared_config().await.map_err(to_rpc_error)?;
        Ok(SetConfigResponse { effective })
    }

    /// config.set_window.v1
    pub async fn set_window_config(
        &self,
        params: SetWindowConfigRequest,
    ) -> RpcResult<SetConfigResponse> {
        self.config
            .save_window_config(params.window_id, params.config)
            .await
            .map_err(to_rpc_error)?;
        let effective = self
            .config
            .load_window_config(params.window_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(SetConfigResponse { effective })
    }

    // ------------------------------------------------------------------
    // browser.*
    // ------------------------------------------------------------------

    /// browser.windows.v1
    pub async fn windows(&self, _params: WindowsRequest) -> RpcResult<WindowsResponse> {
        let windows = self.browser.get_all_windows().await.map_err(to_rpc_error)?;
        Ok(WindowsResponse { windows })
    }

    /// browser.open_window.v1
    pub async fn open_window(&self, _params: OpenWindowRequest) -> RpcResult<OpenWindowResponse> {
        let window_id = self.browser.open_window().map_err(to_rpc_error)?;
        debug!(window_id, "Window opened");
        Ok(OpenWindowResponse { window_id })
    }

    /// browser.open_tab.v1
    pub async fn open_tab(&self, params: OpenTabRequest) -> RpcResult<TabResponse> {
        let tab = self
            .browser
            .open_tab(params.window_id, params.url, params.title)
            .map_err(to_rpc_error)?;
        debug!(tab_id = tab.id, window_id = tab.window_id, "Tab opened");
        Ok(TabResponse { tab })
    }

    /// browser.tab_loaded.v1
    pub async fn tab_loaded(&self, params: TabLoadedRequest) -> RpcResult<TabResponse> {
        let tab = self
            .browser
            .set_tab_status(params.tab_id, TabStatus::Complete)
            .map_err(to_rpc_error)?;
        Ok(TabResponse { tab })
    }

    /// browser.close_tab.v1
    pub async fn close_tab(&self, params: CloseTabRequest) -> RpcResult<AckResponse> {
        self.browser
            .remove_tab(params.tab_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(AckResponse { ok: true })
    }

    /// browser.close_window.v1
    pub async fn close_window(&self, params: CloseWindowRequest) -> RpcResult<AckResponse> {
        self.browser
            .remove_window(params.window_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(AckResponse { ok: true })
    }

    /// browser.send_tab.v1
    pub async fn send_tab(&self, params: SendTabRequest) -> RpcResult<AckResponse> {
        self.automation
            .send_tab(params.tab_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(AckResponse { ok: true })
    }

    /// browser.send_window.v1
    pub async fn send_window(&self, params: SendWindowRequest) -> RpcResult<EnqueueResponse> {
        let inserted = self
            .automation
            .send_window(params.window_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(EnqueueResponse {
            window_id: params.window_id,
            inserted,
        })
    }

    /// browser.send_link.v1
    pub async fn send_link(&self, params: SendLinkRequest) -> RpcResult<EnqueueResponse> {
        let inserted = self
            .automation
            .send_link(params.window_id, &params.url, &params.title)
            .await
            .map_err(to_rpc_error)?;
        Ok(EnqueueResponse {
            window_id: params.window_id,
            inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use tabqueue_core::application::{
        shutdown_channel, spawn_coordinator, DequeueOptions, QueueModel, ShutdownSender,
        TransactionClient,
    };
    use tabqueue_core::domain::{ConfigOverrides, QueueItem, QueueItemPatch};
    use tabqueue_core::port::key_provider::SequentialKeyProvider;
    use tabqueue_core::port::store::memory::InMemoryStore;
    use tabqueue_core::port::KeyValueStore;
    use std::time::Duration;

    fn handler() -> (RpcHandler, ShutdownSender) {
        let (sender, shutdown) = shutdown_channel();
        let (coordinator, _join) = spawn_coordinator(Duration::from_secs(30), shutdown);
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let browser = Arc::new(InMemoryBrowser::new());
        let config = ConfigManager::new(store.clone());
        let model = QueueModel::new(
            store.clone(),
            browser.clone(),
            Arc::new(config.clone()),
            Arc::new(SequentialKeyProvider::new()),
        );
        let queues = QueueService::new(TransactionClient::new(coordinator, store), model);
        let automation = TabAutomation::new(queues.clone(), config.clone());
        (RpcHandler::new(queues, config, browser, automation), sender)
    }

    fn enqueue_request(window_id: i64, urls: &[&str]) -> EnqueueRequest {
        EnqueueRequest {
            window_id,
            items: urls.iter().map(|url| QueueItem::new(*url)).collect(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_list() {
        let (handler, _shutdown) = handler();

        let response = handler
            .enqueue(enqueue_request(1, &["a", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(response.inserted, 2);

        let list = handler.list_queues(ListQueuesRequest::default()).await.unwrap();
        assert_eq!(list.window_queues.len(), 1);
        assert_eq!(list.window_queues[0].items.len(), 2);
        assert!(list.saved_queues.is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_not_found() {
        let (handler, _shutdown) = handler();
        handler.enqueue(enqueue_request(1, &["a"])).await.unwrap();

        let err = handler
            .remove_item(RemoveItemRequest {
                window_id: 1,
                index: 5,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lock_item_then_save_window() {
        let (handler, _shutdown) = handler();
        handler.enqueue(enqueue_request(1, &["a", "b"])).await.unwrap();

        let locked = handler
            .set_item(SetItemRequest {
                window_id: 1,
                index: 0,
                patch: QueueItemPatch::locked(true),
            })
            .await
            .unwrap();
        assert!(locked.item.locked);

        let saved = handler
            .save_window(SaveWindowRequest { window_id: 1 })
            .await
            .unwrap();
        assert!(saved.key.is_some());

        let list = handler.list_queues(ListQueuesRequest::default()).await.unwrap();
        assert_eq!(list.saved_queues.len(), 1);
        assert_eq!(list.saved_queues[0].items.len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_unknown_key_is_not_found() {
        let (handler, _shutdown) = handler();

        let err = handler
            .deploy(DeployRequest {
                key: "missing".to_string(),
                window_id: 1,
                options: Default::default(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename_unknown_saved_queue_reports_unchanged() {
        let (handler, _shutdown) = handler();

        let response = handler
            .rename_saved(RenameSavedRequest {
                key: "missing".to_string(),
                name: "n".to_string(),
            })
            .await
            .unwrap();

        assert!(!response.changed);
    }

    #[tokio::test]
    async fn test_invalid_shared_config_is_rejected() {
        let (handler, _shutdown) = handler();

        let err = handler
            .set_shared_config(SetSharedConfigRequest {
                config: ConfigOverrides {
                    upper_limit_value: Some(2),
                    lower_limit_value: Some(4),
                    ..Default::default()
                },
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_window_config_layers_over_shared() {
        let (handler, _shutdown) = handler();
        handler
            .set_shared_config(SetSharedConfigRequest {
                config: ConfigOverrides {
                    upper_limit_value: Some(20),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let response = handler
            .set_window_config(SetWindowConfigRequest {
                window_id: 3,
                config: ConfigOverrides {
                    ignore_duplicates: Some(false),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(response.effective.upper_limit_value, 20);
        assert!(!response.effective.ignore_duplicates);

        let fetched = handler
            .get_config(GetConfigRequest { window_id: None })
            .await
            .unwrap();
        assert!(fetched.window.is_none());
        assert!(fetched.effective.ignore_duplicates);
    }

    #[tokio::test]
    async fn test_dequeue_opens_tab_in_window() {
        let (handler, _shutdown) = handler();
        let window_id = handler
            .open_window(OpenWindowRequest::default())
            .await
            .unwrap()
            .window_id;
        handler
            .enqueue(enqueue_request(window_id, &["https://queued"]))
            .await
            .unwrap();

        let response = handler
            .dequeue(DequeueRequest {
                window_id,
                index: 0,
                options: DequeueOptions::default(),
            })
            .await
            .unwrap();

        assert_eq!(response.tab.url, "https://queued");
        let windows = handler.windows(WindowsRequest::default()).await.unwrap();
        assert_eq!(windows.windows[0].tabs.len(), 1);
        let list = handler.list_queues(ListQueuesRequest::default()).await.unwrap();
        assert!(list.window_queues.is_empty());
    }

    #[tokio::test]
    async fn test_send_window_queues_tabs_and_closes_window() {
        let (handler, _shutdown) = handler();
        let window_id = handler
            .open_window(OpenWindowRequest::default())
            .await
            .unwrap()
            .window_id;
        for url in ["https://a", "https://b"] {
            handler
                .open_tab(OpenTabRequest {
                    window_id,
                    url: url.to_string(),
                    title: String::new(),
                })
                .await
                .unwrap();
        }

        let response = handler
            .send_window(SendWindowRequest { window_id })
            .await
            .unwrap();

        assert_eq!(response.inserted, 2);
        let windows = handler.windows(WindowsRequest::default()).await.unwrap();
        assert!(windows.windows.is_empty());
    }

    #[tokio::test]
    async fn test_close_unknown_tab_is_not_found() {
        let (handler, _shutdown) = handler();

        let err = handler
            .close_tab(CloseTabRequest { tab_id: 42 })
            .await
            .unwrap_err();

        assert_eq!(err.code(), code::NOT_FOUND);
    }
}
