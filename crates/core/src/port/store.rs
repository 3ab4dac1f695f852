// Persistent Key-Value Store Port
//
// Values are JSON documents addressed by string keys. A write replaces the
// whole value of every key it names; there is no sub-key granularity.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Key -> JSON value map used for bulk reads and writes
pub type StoreValues = Map<String, Value>;

/// Change notification payload: every key whose value changed in one write
pub type StoreChanges = BTreeMap<String, ValueChange>;

/// Capacity of the change notification broadcast channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Top-level store keys
pub mod keys {
    pub const WINDOW_QUEUES: &str = "window_queues";
    pub const SAVED_QUEUES: &str = "saved_queues";
    pub const SHARING_CONFIG: &str = "sharing_config";
    pub const WINDOW_CONFIGS: &str = "window_configs";
}

/// Old and new value of one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    #[serde(rename = "oldValue", default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(rename = "newValue", default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// Store interface shared by every execution context
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the keys of `defaults`; absent keys yield their default value
    async fn get(&self, defaults: StoreValues) -> Result<StoreValues>;

    /// Write every key of `values` in one call
    async fn set(&self, values: StoreValues) -> Result<()>;

    /// Receive change notifications for writes made by any context
    fn subscribe(&self) -> broadcast::Receiver<StoreChanges>;
}

/// Build the notification for a write of `values` over `current` contents.
///
/// Keys whose stored value is unchanged are left out.
pub fn collect_changes(current: &StoreValues, values: &StoreValues) -> StoreChanges {
    values
        .iter()
        .filter(|(key, new_value)| current.get(*key) != Some(*new_value))
        .map(|(key, new_value)| {
            (
                key.clone(),
                ValueChange {
                    old_value: current.get(key).cloned(),
                    new_value: Some(new_value.clone()),
                },
            )
        })
        .collect()
}

// ============================================================================
// In-memory implementation (single process, used by tests and embedding)
// ============================================================================

pub mod memory {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Store kept in process memory
    pub struct InMemoryStore {
        entries: Mutex<StoreValues>,
        changes: broadcast::Sender<StoreChanges>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
            Self {
                entries: Mutex::new(StoreValues::new()),
                changes,
            }
        }

        fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreValues>> {
            self.entries
                .lock()
                .map_err(|e| AppError::Store(format!("store lock poisoned: {}", e)))
        }
    }

    impl Default for InMemoryStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl KeyValueStore for InMemoryStore {
        async fn get(&self, defaults: StoreValues) -> Result<StoreValues> {
            let entries = self.lock()?;
            Ok(defaults
                .into_iter()
                .map(|(key, default)| {
                    let value = entries.get(&key).cloned().unwrap_or(default);
                    (key, value)
                })
                .collect())
        }

        async fn set(&self, values: StoreValues) -> Result<()> {
            let mut entries = self.lock()?;
            let changes = collect_changes(&entries, &values);
            for (key, value) in values {
                entries.insert(key, value);
            }
            if !changes.is_empty() {
                // No subscribers is fine
                let _ = self.changes.send(changes);
            }
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreChanges> {
            self.changes.subscribe()
        }
    }
}
