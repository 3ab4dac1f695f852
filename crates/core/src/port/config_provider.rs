// Configuration Provider Port

use crate::domain::{QueueConfig, WindowId};
use crate::error::Result;
use async_trait::async_trait;

/// Source of the effective per-window configuration
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Merge defaults < shared config < window-specific config
    async fn load_window_config(&self, window_id: WindowId) -> Result<QueueConfig>;
}

/// Fixed configuration for every window (tests)
pub struct StaticConfigProvider {
    config: QueueConfig,
}

impl StaticConfigProvider {
    pub fn new(config: QueueConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn load_window_config(&self, _window_id: WindowId) -> Result<QueueConfig> {
        Ok(self.config.clone())
    }
}
