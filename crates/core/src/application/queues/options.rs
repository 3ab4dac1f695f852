// Operation options

use crate::domain::DequeuePosition;
use crate::port::TabId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause between creating a dequeued tab and setting its active state
pub const DEQUEUE_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// How a dequeue opens its tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DequeueOptions {
    /// Activate the new tab once it settled
    pub active: bool,
    /// Remove the item from its queue
    pub delete: bool,
    pub position: DequeuePosition,
    pub opener_tab_id: Option<TabId>,
}

impl Default for DequeueOptions {
    fn default() -> Self {
        Self {
            active: false,
            delete: true,
            position: DequeuePosition::Rightmost,
            opener_tab_id: None,
        }
    }
}

/// How a saved queue is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployOptions {
    /// Remove the saved queue afterwards (never applied to locked queues)
    pub delete: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self { delete: true }
    }
}
