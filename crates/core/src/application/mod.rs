// Application Layer - Transactions, queue operations and automation

pub mod automation;
pub mod config;
pub mod queues;
pub mod reconciler;
pub mod shutdown;
pub mod transaction;

// Re-exports
pub use automation::TabAutomation;
pub use config::ConfigManager;
pub use queues::{DeployOptions, DequeueOptions, QueueModel, QueueService};
pub use reconciler::{QueueEvent, Reconciler};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use transaction::{spawn_coordinator, CoordinatorHandle, TransactionClient, TransactionError};
