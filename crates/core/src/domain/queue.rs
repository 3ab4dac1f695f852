// Queue Domain Model
//
// Window queues and saved queues are persisted as JSON inside two whole
// collections, so field names follow the persisted layout (`windowId`,
// `favIconUrl`) rather than Rust naming.

use crate::domain::config::EnqueuePosition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Browser window identifier
pub type WindowId = i64;

/// Saved queue key (`YYYY/MM/DD-hh:mm:ss-<n>`)
pub type SavedQueueKey = String;

/// One deferred page reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueItem {
    pub title: String,
    pub url: String,
    #[serde(rename = "favIconUrl")]
    pub fav_icon_url: String,
    pub locked: bool,
}

impl QueueItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_fav_icon_url(mut self, fav_icon_url: impl Into<String>) -> Self {
        self.fav_icon_url = fav_icon_url.into();
        self
    }
}

/// Partial update for a queue item (missing fields are left untouched)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "favIconUrl", skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl QueueItemPatch {
    pub fn locked(locked: bool) -> Self {
        Self {
            locked: Some(locked),
            ..Self::default()
        }
    }

    pub fn apply(&self, item: &mut QueueItem) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(url) = &self.url {
            item.url = url.clone();
        }
        if let Some(fav_icon_url) = &self.fav_icon_url {
            item.fav_icon_url = fav_icon_url.clone();
        }
        if let Some(locked) = self.locked {
            item.locked = locked;
        }
    }
}

/// Queue bound to one live window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowQueue {
    #[serde(rename = "windowId")]
    pub window_id: WindowId,
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

impl WindowQueue {
    pub fn new(window_id: WindowId) -> Self {
        Self {
            window_id,
            items: Vec::new(),
        }
    }

    pub fn with_items(window_id: WindowId, items: Vec<QueueItem>) -> Self {
        Self { window_id, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert items according to the enqueue policy.
    ///
    /// With `ignore_duplicates`, a URL already present in the queue (or
    /// inserted earlier in the same batch) is skipped. `Top` inserts each
    /// item at the head in turn, so a batch lands in reverse order.
    ///
    /// Returns the number of items actually inserted.
    pub fn push_items(
        &mut self,
        items: impl IntoIterator<Item = QueueItem>,
        position: EnqueuePosition,
        ignore_duplicates: bool,
    ) -> usize {
        let mut excluded: HashSet<String> = if ignore_duplicates {
            self.items.iter().map(|item| item.url.clone()).collect()
        } else {
            HashSet::new()
        };

        let mut inserted = 0;
        for item in items {
            if excluded.contains(&item.url) {
                continue;
            }
            if ignore_duplicates {
                excluded.insert(item.url.clone());
            }
            match position {
                EnqueuePosition::Top => self.items.insert(0, item),
                EnqueuePosition::Last => self.items.push(item),
            }
            inserted += 1;
        }
        inserted
    }

    /// Index of the first item that is not locked
    pub fn first_unlocked_index(&self) -> Option<usize> {
        self.items.iter().position(|item| !item.locked)
    }
}

/// Queue detached from any window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQueue {
    pub key: SavedQueueKey,
    pub name: String,
    #[serde(default)]
    pub items: Vec<QueueItem>,
    #[serde(default)]
    pub locked: bool,
}

impl SavedQueue {
    /// New unlocked saved queue; the name defaults to the key
    pub fn new(key: impl Into<String>, items: Vec<QueueItem>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            items,
            locked: false,
        }
    }
}

/// Partial update for a saved queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedQueuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl SavedQueuePatch {
    pub fn apply(&self, queue: &mut SavedQueue) {
        if let Some(name) = &self.name {
            queue.name = name.clone();
        }
        if let Some(locked) = self.locked {
            queue.locked = locked;
        }
    }
}

/// Common lookup surface of window queues and saved queues
pub trait Queue {
    fn window_id(&self) -> Option<WindowId> {
        None
    }

    fn key(&self) -> Option<&str> {
        None
    }

    fn items(&self) -> &[QueueItem];
}

impl Queue for WindowQueue {
    fn window_id(&self) -> Option<WindowId> {
        Some(self.window_id)
    }

    fn items(&self) -> &[QueueItem] {
        &self.items
    }
}

impl Queue for SavedQueue {
    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn items(&self) -> &[QueueItem] {
        &self.items
    }
}

/// Lookup criteria; all supplied criteria must match, absent ones are ignored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    pub window_id: Option<WindowId>,
    pub key: Option<String>,
}

impl QueueFilter {
    pub fn window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            key: None,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            window_id: None,
            key: Some(key.into()),
        }
    }

    pub fn matches<Q: Queue>(&self, queue: &Q) -> bool {
        if let Some(window_id) = self.window_id {
            if queue.window_id() != Some(window_id) {
                return false;
            }
        }
        if let Some(key) = &self.key {
            if queue.key() != Some(key.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Position of the first queue matching the filter
pub fn find_queue_index<Q: Queue>(queues: &[Q], filter: &QueueFilter) -> Option<usize> {
    queues.iter().position(|queue| filter.matches(queue))
}

/// First queue matching the filter
pub fn find_queue<'a, Q: Queue>(queues: &'a [Q], filter: &QueueFilter) -> Option<&'a Q> {
    find_queue_index(queues, filter).map(|index| &queues[index])
}
