// Configuration Manager
//
// Stored layers live under `sharing_config` (one `ConfigOverrides`) and
// `window_configs` (windowId -> `ConfigOverrides`). Reading resolves
// defaults < shared < window.

use crate::domain::{ConfigOverrides, QueueConfig, WindowId};
use crate::error::{AppError, Result};
use crate::port::store::keys;
use crate::port::{ConfigProvider, KeyValueStore, StoreValues};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

type WindowConfigs = BTreeMap<String, ConfigOverrides>;

#[derive(Clone)]
pub struct ConfigManager {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load(&self, key: &str) -> Result<Value> {
        let mut defaults = StoreValues::new();
        defaults.insert(key.to_string(), json!({}));
        let mut values = self.store.get(defaults).await?;
        Ok(values.remove(key).unwrap_or_else(|| json!({})))
    }

    async fn store_value(&self, key: &str, value: Value) -> Result<()> {
        let mut values = StoreValues::new();
        values.insert(key.to_string(), value);
        self.store.set(values).await
    }

    pub async fn shared_overrides(&self) -> Result<ConfigOverrides> {
        Ok(serde_json::from_value(self.load(keys::SHARING_CONFIG).await?)?)
    }

    async fn window_configs(&self) -> Result<WindowConfigs> {
        Ok(serde_json::from_value(self.load(keys::WINDOW_CONFIGS).await?)?)
    }

    pub async fn window_overrides(&self, window_id: WindowId) -> Result<Option<ConfigOverrides>> {
        let mut configs = self.window_configs().await?;
        Ok(configs.remove(&window_id.to_string()))
    }

    /// Defaults < shared
    pub async fn load_shared_config(&self) -> Result<QueueConfig> {
        Ok(QueueConfig::resolve(&self.shared_overrides().await?, None))
    }

    /// Defaults < shared < window
    pub async fn load_window_config(&self, window_id: WindowId) -> Result<QueueConfig> {
        let shared = self.shared_overrides().await?;
        let window = self.window_overrides(window_id).await?;
        Ok(QueueConfig::resolve(&shared, window.as_ref()))
    }

    /// Replace the shared layer; refused when the result fails verification
    pub async fn save_shared_config(&self, overrides: ConfigOverrides) -> Result<()> {
        reject_warnings(&QueueConfig::resolve(&overrides, None))?;
        self.store_value(keys::SHARING_CONFIG, serde_json::to_value(&overrides)?)
            .await?;
        info!("Shared configuration saved");
        Ok(())
    }

    /// Replace one window's layer; refused when the result fails verification
    pub async fn save_window_config(
        &self,
        window_id: WindowId,
        overrides: ConfigOverrides,
    ) -> Result<()> {
        let shared = self.shared_overrides().await?;
        reject_warnings(&QueueConfig::resolve(&shared, Some(&overrides)))?;

        let mut configs = self.window_configs().await?;
        configs.insert(window_id.to_string(), overrides);
        self.store_value(keys::WINDOW_CONFIGS, serde_json::to_value(&configs)?)
            .await?;
        debug!(window_id, "Window configuration saved");
        Ok(())
    }

    pub async fn remove_window_config(&self, window_id: WindowId) -> Result<()> {
        let mut configs = self.window_configs().await?;
        if configs.remove(&window_id.to_string()).is_some() {
            self.store_value(keys::WINDOW_CONFIGS, serde_json::to_value(&configs)?)
                .await?;
            debug!(window_id, "Window configuration removed");
        }
        Ok(())
    }

    pub async fn clear_window_configs(&self) -> Result<()> {
        self.store_value(keys::WINDOW_CONFIGS, json!({})).await
    }

    /// Back to the built-in defaults
    pub async fn reset(&self) -> Result<()> {
        let mut values = StoreValues::new();
        values.insert(keys::SHARING_CONFIG.to_string(), json!({}));
        values.insert(keys::WINDOW_CONFIGS.to_string(), json!({}));
        self.store.set(values).await?;
        info!("Configuration reset to defaults");
        Ok(())
    }
}

fn reject_warnings(config: &QueueConfig) -> Result<()> {
    let warnings = config.verify();
    if warnings.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(warnings.join("; ")))
    }
}

#[async_trait]
impl ConfigProvider for ConfigManager {
    async fn load_window_config(&self, window_id: WindowId) -> Result<QueueConfig> {
        ConfigManager::load_window_config(self, window_id).await
    }
}
