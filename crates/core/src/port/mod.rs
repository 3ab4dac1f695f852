// Port Layer - Interfaces for external collaborators

pub mod browser;
pub mod config_provider;
pub mod key_provider; // For deterministic testing
pub mod store;
pub mod time_provider;

// Re-exports
pub use browser::{Browser, BrowserEvent, CreateTab, Tab, TabId, TabStatus, Window};
pub use config_provider::ConfigProvider;
pub use key_provider::KeyProvider;
pub use store::{KeyValueStore, StoreChanges, StoreValues, ValueChange};
pub use time_provider::TimeProvider;
