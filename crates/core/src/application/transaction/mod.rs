// Transaction Serialization
//
// A single coordinator task grants exclusive access to the queue
// collections, one transaction at a time, in registration order. Clients
// talk to it only through per-transaction message channels.

pub mod channel;
pub mod client;
pub mod constants;
pub mod coordinator;
pub mod protocol;

pub use channel::{ClientPort, Connector};
pub use client::TransactionClient;
pub use coordinator::{spawn_coordinator, CoordinatorHandle};
pub use protocol::{Request, Response, TerminationReason, TransactionId};

use thiserror::Error;

/// Transaction-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction {0} exceeded the execution timeout and was evicted")]
    TimedOut(TransactionId),

    #[error("transaction {0} exceeded its callback budget and was rolled back")]
    BudgetExceeded(TransactionId),

    #[error("transaction aborted: channel closed before grant")]
    Aborted,
}
