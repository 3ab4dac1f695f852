//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results. Queue and
//! configuration records are passed through in their persisted layout.

use serde::{Deserialize, Serialize};
use tabqueue_core::application::{DeployOptions, DequeueOptions};
use tabqueue_core::domain::{
    ConfigOverrides, QueueConfig, QueueItem, QueueItemPatch, SavedQueue, SavedQueueKey,
    SavedQueuePatch, WindowId, WindowQueue,
};
use tabqueue_core::port::{Tab, TabId, Window};

// ============================================================================
// queues.*
// ============================================================================

/// queues.list.v1 - Every window queue and saved queue
#[derive(Debug, Default, Deserialize)]
pub struct ListQueuesRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListQueuesResponse {
    pub window_queues: Vec<WindowQueue>,
    pub saved_queues: Vec<SavedQueue>,
}

/// queues.enqueue.v1 - Append items to a window queue
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub window_id: WindowId,
    pub items: Vec<QueueItem>,
}

/// Shared by every call that inserts into a window queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub window_id: WindowId,
    pub inserted: usize,
}

/// queues.dequeue.v1 - Open a queued item as a tab
#[derive(Debug, Deserialize)]
pub struct DequeueRequest {
    pub window_id: WindowId,
    pub index: usize,
    #[serde(default)]
    pub options: DequeueOptions,
}

/// queues.remove_item.v1
#[derive(Debug, Deserialize)]
pub struct RemoveItemRequest {
    pub window_id: WindowId,
    pub index: usize,
}

/// queues.set_item.v1 - Patch one item (lock, rename, ...)
#[derive(Debug, Deserialize)]
pub struct SetItemRequest {
    pub window_id: WindowId,
    pub index: usize,
    pub patch: QueueItemPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub window_id: WindowId,
    pub index: usize,
    pub item: QueueItem,
}

/// queues.save_window.v1 - Detach a window queue into a saved queue
#[derive(Debug, Deserialize)]
pub struct SaveWindowRequest {
    pub window_id: WindowId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveWindowResponse {
    pub window_id: WindowId,
    /// None when the window had no queue
    pub key: Option<SavedQueueKey>,
}

/// queues.save_all.v1
#[derive(Debug, Default, Deserialize)]
pub struct SaveAllRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAllResponse {
    pub keys: Vec<SavedQueueKey>,
}

// ============================================================================
// saved.*
// ============================================================================

/// saved.deploy.v1 - Copy a saved queue into a window queue
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub key: SavedQueueKey,
    pub window_id: WindowId,
    #[serde(default)]
    pub options: DeployOptions,
}

/// saved.rename.v1
#[derive(Debug, Deserialize)]
pub struct RenameSavedRequest {
    pub key: SavedQueueKey,
    pub name: String,
}

/// saved.set.v1 - Patch name and lock state
#[derive(Debug, Deserialize)]
pub struct SetSavedRequest {
    pub key: SavedQueueKey,
    pub patch: SavedQueuePatch,
}

/// saved.remove.v1
#[derive(Debug, Deserialize)]
pub struct RemoveSavedRequest {
    pub key: SavedQueueKey,
}

/// Result of saved.rename / saved.set / saved.remove
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQueueResponse {
    pub key: SavedQueueKey,
    /// False when no saved queue had this key
    pub changed: bool,
}

// ============================================================================
// config.*
// ============================================================================

/// config.get.v1 - Stored layers and the effective configuration
#[derive(Debug, Default, Deserialize)]
pub struct GetConfigRequest {
    #[serde(default)]
    pub window_id: Option<WindowId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetConfigResponse {
    pub shared: ConfigOverrides,
    pub window: Option<ConfigOverrides>,
    pub effective: QueueConfig,
}

/// config.set_shared.v1
#[derive(Debug, Deserialize)]
pub struct SetSharedConfigRequest {
    pub config: ConfigOverrides,
}

/// config.set_window.v1
#[derive(Debug, Deserialize)]
pub struct SetWindowConfigRequest {
    pub window_id: WindowId,
    pub config: ConfigOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfigResponse {
    pub effective: QueueConfig,
}

// ============================================================================
// browser.*
// ============================================================================

/// browser.windows.v1
#[derive(Debug, Default, Deserialize)]
pub struct WindowsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsResponse {
    pub windows: Vec<Window>,
}

/// browser.open_window.v1
#[derive(Debug, Default, Deserialize)]
pub struct OpenWindowRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWindowResponse {
    pub window_id: WindowId,
}

/// browser.open_tab.v1 - User opens a tab (starts loading)
#[derive(Debug, Deserialize)]
pub struct OpenTabRequest {
    pub window_id: WindowId,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// browser.tab_loaded.v1 - A tab finished loading
#[derive(Debug, Deserialize)]
pub struct TabLoadedRequest {
    pub tab_id: TabId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabResponse {
    pub tab: Tab,
}

/// browser.close_tab.v1
#[derive(Debug, Deserialize)]
pub struct CloseTabRequest {
    pub tab_id: TabId,
}

/// browser.close_window.v1
#[derive(Debug, Deserialize)]
pub struct CloseWindowRequest {
    pub window_id: WindowId,
}

/// browser.send_tab.v1 - Queue a tab (context menu "send tab")
#[derive(Debug, Deserialize)]
pub struct SendTabRequest {
    pub tab_id: TabId,
}

/// browser.send_window.v1 - Queue every tab, then close the window
#[derive(Debug, Deserialize)]
pub struct SendWindowRequest {
    pub window_id: WindowId,
}

/// browser.send_link.v1 - Queue a link without opening it
#[derive(Debug, Deserialize)]
pub struct SendLinkRequest {
    pub window_id: WindowId,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}
