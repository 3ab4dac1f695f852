// Typed access to the two queue collections

use crate::domain::{SavedQueue, WindowQueue};
use crate::error::Result;
use crate::port::store::keys;
use crate::port::{KeyValueStore, StoreValues};
use serde_json::Value;
use std::sync::Arc;

/// Reads and writes whole collections; callers must hold a transaction
#[derive(Clone)]
pub struct QueueStorage {
    store: Arc<dyn KeyValueStore>,
}

impl QueueStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load(&self, key: &str) -> Result<Value> {
        let mut defaults = StoreValues::new();
        defaults.insert(key.to_string(), Value::Array(Vec::new()));
        let mut values = self.store.get(defaults).await?;
        Ok(values.remove(key).unwrap_or(Value::Array(Vec::new())))
    }

    pub async fn window_queues(&self) -> Result<Vec<WindowQueue>> {
        Ok(serde_json::from_value(self.load(keys::WINDOW_QUEUES).await?)?)
    }

    pub async fn saved_queues(&self) -> Result<Vec<SavedQueue>> {
        Ok(serde_json::from_value(self.load(keys::SAVED_QUEUES).await?)?)
    }

    pub async fn set_window_queues(&self, queues: &[WindowQueue]) -> Result<()> {
        let mut values = StoreValues::new();
        values.insert(keys::WINDOW_QUEUES.to_string(), serde_json::to_value(queues)?);
        self.store.set(values).await
    }

    pub async fn set_saved_queues(&self, queues: &[SavedQueue]) -> Result<()> {
        let mut values = StoreValues::new();
        values.insert(keys::SAVED_QUEUES.to_string(), serde_json::to_value(queues)?);
        self.store.set(values).await
    }

    /// Replace both collections in one store write
    pub async fn set_all(&self, window: &[WindowQueue], saved: &[SavedQueue]) -> Result<()> {
        let mut values = StoreValues::new();
        values.insert(keys::WINDOW_QUEUES.to_string(), serde_json::to_value(window)?);
        values.insert(keys::SAVED_QUEUES.to_string(), serde_json::to_value(saved)?);
        self.store.set(values).await
    }
}
