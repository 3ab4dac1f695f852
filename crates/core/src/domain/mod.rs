// Domain Layer - Pure queue model and configuration records

pub mod config;
pub mod error;
pub mod queue;

// Re-exports
pub use config::{
    AutoRestorePosition, ConfigOverrides, DequeuePosition, EnqueuePosition, QueueConfig,
    TargetTabToAutoStore,
};
pub use error::DomainError;
pub use queue::{
    find_queue, find_queue_index, Queue, QueueFilter, QueueItem, QueueItemPatch, SavedQueue,
    SavedQueueKey, SavedQueuePatch, WindowId, WindowQueue,
};
