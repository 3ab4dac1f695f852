// Transaction Client
//
// Wraps a callback in one exclusive transaction: register, wait for the
// grant, snapshot both queue collections, run, roll back on failure,
// terminate.

use super::channel::ClientPort;
use super::constants::{callback_budget, TRANSACTION_CHANNEL_NAME};
use super::coordinator::CoordinatorHandle;
use super::protocol::{Request, Response, TransactionId};
use super::TransactionError;
use crate::error::Result;
use crate::port::store::keys;
use crate::port::{KeyValueStore, StoreValues};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

/// Runs callbacks under the coordinator's mutual exclusion
#[derive(Clone)]
pub struct TransactionClient {
    coordinator: CoordinatorHandle,
    store: Arc<dyn KeyValueStore>,
    callback_budget: Duration,
}

impl TransactionClient {
    pub fn new(coordinator: CoordinatorHandle, store: Arc<dyn KeyValueStore>) -> Self {
        let callback_budget = callback_budget(coordinator.timeout());
        Self {
            coordinator,
            store,
            callback_budget,
        }
    }

    /// Override how long a grant may be used before the callback is cancelled.
    ///
    /// The budget never exceeds the default for the coordinator's timeout, so
    /// a rollback always finishes while the grant is still held.
    pub fn with_callback_budget(mut self, budget: Duration) -> Self {
        let ceiling = callback_budget(self.coordinator.timeout());
        if budget > ceiling {
            warn!(
                requested_ms = budget.as_millis() as u64,
                ceiling_ms = ceiling.as_millis() as u64,
                "Callback budget clamped below the transaction timeout"
            );
        }
        self.callback_budget = budget.min(ceiling);
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Run `callback` with exclusive access to the queue collections.
    ///
    /// The budget is counted from the grant and covers the snapshot, the
    /// callback and a rollback.
    ///
    /// - `Ok(Some(value))`: the callback succeeded and its writes stand
    /// - `Ok(None)`: the channel closed before a grant; nothing ran
    /// - `Err(TimedOut)`: the coordinator evicted the transaction; the
    ///   callback was cancelled and nothing is rolled back, since the next
    ///   holder may already own the collections
    /// - `Err(_)` otherwise: the callback failed or overran its budget, and
    ///   both collections were restored to their state at grant time
    pub async fn run_exclusive<F, Fut, T>(&self, callback: F) -> Result<Option<T>>
    where
        F: FnOnce(TransactionId) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut port = self.coordinator.connect(TRANSACTION_CHANNEL_NAME);
        if !port.send(Request::Register) {
            debug!("Coordinator unavailable, transaction aborted");
            return Ok(None);
        }

        let transaction_id = match port.recv().await {
            Some(Response::Granted { transaction_id }) => transaction_id,
            Some(Response::TerminationAcknowledged) | None => {
                debug!("Channel closed before grant, transaction aborted");
                return Ok(None);
            }
        };
        let deadline = Instant::now() + self.callback_budget;

        let mut backup = None;
        let raced = tokio::select! {
            biased;
            response = port.recv() => Err(response),
            outcome = self.execute(transaction_id, deadline, &mut backup, callback) => Ok(outcome),
        };

        let outcome = match raced {
            Ok(outcome) => {
                release(transaction_id, &mut port).await;
                outcome
            }
            Err(Some(_)) => {
                error!(transaction_id, "Grant lost to the coordinator timeout, callback cancelled");
                Err(TransactionError::TimedOut(transaction_id).into())
            }
            Err(None) => {
                // Coordinator is gone, so no other transaction can hold a grant
                warn!(transaction_id, "Coordinator stopped during transaction, rolling back");
                if let Some(backup) = backup {
                    self.rollback(transaction_id, backup).await;
                }
                Err(TransactionError::Aborted.into())
            }
        };
        port.close();

        outcome.map(Some)
    }

    async fn execute<F, Fut, T>(
        &self,
        transaction_id: TransactionId,
        deadline: Instant,
        backup: &mut Option<StoreValues>,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(TransactionId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let snapshot = match timeout_at(deadline, self.snapshot()).await {
            Ok(snapshot) => snapshot?,
            Err(_) => {
                // Nothing was written yet
                error!(transaction_id, "Snapshot outlasted the callback budget");
                return Err(TransactionError::BudgetExceeded(transaction_id).into());
            }
        };
        let backup = backup.insert(snapshot);

        match timeout_at(deadline, callback(transaction_id)).await {
            Ok(Ok(value)) => {
                debug!(transaction_id, "Transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                warn!(transaction_id, error = %err, "Transaction failed, rolling back");
                self.rollback(transaction_id, backup.clone()).await;
                Err(err)
            }
            Err(_) => {
                error!(
                    transaction_id,
                    budget_ms = self.callback_budget.as_millis() as u64,
                    "Transaction overran its budget, rolling back"
                );
                self.rollback(transaction_id, backup.clone()).await;
                Err(TransactionError::BudgetExceeded(transaction_id).into())
            }
        }
    }

    async fn snapshot(&self) -> Result<StoreValues> {
        let mut defaults = StoreValues::new();
        defaults.insert(keys::WINDOW_QUEUES.to_string(), Value::Array(Vec::new()));
        defaults.insert(keys::SAVED_QUEUES.to_string(), Value::Array(Vec::new()));
        self.store.get(defaults).await
    }

    async fn rollback(&self, transaction_id: TransactionId, backup: StoreValues) {
        if let Err(err) = self.store.set(backup).await {
            error!(transaction_id, error = %err, "Rollback failed");
        }
    }
}

/// Give the grant back and wait for the coordinator to confirm.
///
/// An eviction that raced the end of the callback has already queued its
/// acknowledgment, which ends the wait just the same.
async fn release(transaction_id: TransactionId, port: &mut ClientPort) {
    if port.send(Request::Terminate { transaction_id }) {
        while let Some(response) = port.recv().await {
            if response == Response::TerminationAcknowledged {
                break;
            }
        }
    }
}
