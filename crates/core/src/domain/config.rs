// Queue Configuration Records
//
// Effective configuration is resolved as defaults < shared < window-specific.
// Stored layers are `ConfigOverrides` (every field optional); the resolved
// value is a fully-populated `QueueConfig`.

use serde::{Deserialize, Serialize};

/// Which tab the automatic store picks when the upper limit is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetTabToAutoStore {
    /// Rightmost tab in the strip
    Rightmost,
    /// Most recently created tab
    Latest,
}

/// Where new items go inside a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueuePosition {
    Top,
    Last,
}

/// Where a dequeued tab is opened in the tab strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DequeuePosition {
    Rightmost,
    Rightnext,
    /// Any unknown keyword; treated as `Rightmost`
    #[serde(other)]
    Unrecognized,
}

/// Where an automatically restored tab is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRestorePosition {
    /// Follow `position_to_dequeue`
    Unset,
    Rightmost,
    Rightnext,
}

/// Fully-resolved configuration for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub upper_limit_available: bool,
    pub lower_limit_available: bool,
    pub ignore_duplicates: bool,
    pub tab_closing_after_send: bool,
    pub wait_for_tab_loading: bool,
    pub ignore_loading_tabs: bool,
    pub ignore_active_tabs: bool,
    pub upper_limit_value: u32,
    pub lower_limit_value: u32,
    pub target_tab_to_auto_store: TargetTabToAutoStore,
    pub position_to_enqueue: EnqueuePosition,
    pub position_to_dequeue: DequeuePosition,
    pub position_to_auto_restore: AutoRestorePosition,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            upper_limit_available: true,
            lower_limit_available: true,
            ignore_duplicates: true,
            tab_closing_after_send: true,
            wait_for_tab_loading: true,
            ignore_loading_tabs: true,
            ignore_active_tabs: true,
            upper_limit_value: 10,
            lower_limit_value: 5,
            target_tab_to_auto_store: TargetTabToAutoStore::Rightmost,
            position_to_enqueue: EnqueuePosition::Last,
            position_to_dequeue: DequeuePosition::Rightnext,
            position_to_auto_restore: AutoRestorePosition::Rightmost,
        }
    }
}

/// One stored configuration layer; absent fields fall through to the layer below
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_limit_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_limit_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_duplicates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_closing_after_send: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_tab_loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_loading_tabs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_active_tabs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_limit_value: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_limit_value: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tab_to_auto_store: Option<TargetTabToAutoStore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_to_enqueue: Option<EnqueuePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_to_dequeue: Option<DequeuePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_to_auto_restore: Option<AutoRestorePosition>,
}

impl QueueConfig {
    /// Apply one override layer on top of this configuration
    pub fn merged(mut self, layer: &ConfigOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = layer.$field { self.$field = value; })*
            };
        }
        take!(
            upper_limit_available,
            lower_limit_available,
            ignore_duplicates,
            tab_closing_after_send,
            wait_for_tab_loading,
            ignore_loading_tabs,
            ignore_active_tabs,
            upper_limit_value,
            lower_limit_value,
            target_tab_to_auto_store,
            position_to_enqueue,
            position_to_dequeue,
            position_to_auto_restore,
        );
        self
    }

    /// Resolve defaults < shared < window
    pub fn resolve(shared: &ConfigOverrides, window: Option<&ConfigOverrides>) -> Self {
        let config = Self::default().merged(shared);
        match window {
            Some(layer) => config.merged(layer),
            None => config,
        }
    }

    /// Position used by the automatic restore
    pub fn auto_restore_position(&self) -> DequeuePosition {
        match self.position_to_auto_restore {
            AutoRestorePosition::Unset => self.position_to_dequeue,
            AutoRestorePosition::Rightmost => DequeuePosition::Rightmost,
            AutoRestorePosition::Rightnext => DequeuePosition::Rightnext,
        }
    }

    /// Human-readable problems that make this configuration unsavable
    pub fn verify(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.upper_limit_available
            && self.lower_limit_available
            && self.upper_limit_value < self.lower_limit_value
        {
            warnings.push(format!(
                "upper tab limit ({}) is below the lower tab limit ({})",
                self.upper_limit_value, self.lower_limit_value
            ));
        }
        warnings
    }
}
