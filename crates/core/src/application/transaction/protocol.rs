// Coordinator <-> client message protocol

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique for the lifetime of the coordinator, starting at 1
pub type TransactionId = u64;

/// Client -> coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Queue this channel's transaction
    Register,
    /// Release the slot held by (or queued for) this transaction
    Terminate { transaction_id: TransactionId },
}

/// Coordinator -> client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    /// The transaction now has exclusive access
    Granted { transaction_id: TransactionId },
    /// The transaction has been removed from the coordinator
    TerminationAcknowledged,
}

/// Why a transaction left the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The client asked to terminate
    TerminationRequest,
    /// The client's channel disconnected
    PortClosed,
    /// The grant was held longer than the timeout
    Timeout,
    /// The registration could not be served
    Malformed(String),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TerminationRequest => write!(f, "termination request"),
            TerminationReason::PortClosed => write!(f, "port closed"),
            TerminationReason::Timeout => write!(f, "timeout"),
            TerminationReason::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}
