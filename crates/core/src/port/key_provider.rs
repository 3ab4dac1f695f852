// Saved Queue Key Provider Port (for deterministic testing)

use crate::port::TimeProvider;
use chrono::{DateTime, Local, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Key provider interface (allows deterministic keys in tests)
pub trait KeyProvider: Send + Sync {
    /// Generate a new unique saved queue key
    fn generate_key(&self) -> String;
}

/// Local timestamp plus a process-wide disambiguator (production)
///
/// Format: `YYYY/MM/DD-hh:mm:ss-<n>`, `n` starting at 1.
pub struct TimestampKeyProvider {
    time_provider: Arc<dyn TimeProvider>,
    counter: AtomicU64,
}

impl TimestampKeyProvider {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            counter: AtomicU64::new(1),
        }
    }
}

impl KeyProvider for TimestampKeyProvider {
    fn generate_key(&self) -> String {
        let now: DateTime<Utc> =
            DateTime::from_timestamp_millis(self.time_provider.now_millis()).unwrap_or_default();
        let unique = self.counter.fetch_add(1, Ordering::SeqCst);
        format!(
            "{}-{}",
            now.with_timezone(&Local).format("%Y/%m/%d-%H:%M:%S"),
            unique
        )
    }
}

/// `saved-1`, `saved-2`, ... (tests)
pub struct SequentialKeyProvider {
    counter: AtomicU64,
}

impl SequentialKeyProvider {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for SequentialKeyProvider {
    fn generate_key(&self) -> String {
        format!("saved-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}
