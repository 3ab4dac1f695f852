// Transaction constants
use std::time::Duration;

/// Name under which transaction channels are opened
pub const TRANSACTION_CHANNEL_NAME: &str = "transaction request for queue operation";

/// Time a granted transaction may hold the slot before forced eviction (30s)
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Part of the timeout kept free for the client's own rollback (5s)
pub const ROLLBACK_RESERVE: Duration = Duration::from_secs(5);

/// Capacity of the coordinator failure broadcast
pub const FAILURE_CHANNEL_CAPACITY: usize = 16;

/// Time the client lets a callback run before cancelling and rolling back.
///
/// `timeout - ROLLBACK_RESERVE`, but never less than half the timeout.
pub fn callback_budget(timeout: Duration) -> Duration {
    let floor = timeout / 2;
    timeout
        .checked_sub(ROLLBACK_RESERVE)
        .filter(|budget| *budget >= floor)
        .unwrap_or(floor)
}
