// Change-Notification Reconciler
//
// Store writes always replace a whole collection. This turns a
// collection-level `{oldValue, newValue}` pair into one event per window
// queue or saved queue whose content actually differs.

use crate::application::shutdown::ShutdownToken;
use crate::domain::{SavedQueue, WindowId, WindowQueue};
use crate::port::store::keys;
use crate::port::{KeyValueStore, StoreChanges, ValueChange};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Per-entity change derived from a collection write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    WindowQueueChanged {
        window_id: WindowId,
        old_value: Value,
        new_value: Value,
    },
    SavedQueueChanged {
        key: String,
        old_value: Value,
        new_value: Value,
    },
}

fn entries(side: &Option<Value>) -> &[Value] {
    match side {
        Some(Value::Array(entries)) => entries,
        _ => &[],
    }
}

/// Entities of one collection that differ between old and new value.
///
/// Identifiers come from both sides in first-seen order; a side missing an
/// entity contributes `placeholder(id)` instead. Comparison is JSON
/// structural equality (object key order is irrelevant, array order is not).
fn diff_collection(
    change: &ValueChange,
    id_field: &str,
    placeholder: impl Fn(&Value) -> Option<Value>,
) -> Vec<(Value, Value, Value)> {
    let old_entries = entries(&change.old_value);
    let new_entries = entries(&change.new_value);

    let mut ids: Vec<&Value> = Vec::new();
    for entry in old_entries.iter().chain(new_entries.iter()) {
        if let Some(id) = entry.get(id_field) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    let find = |entries: &[Value], id: &Value| {
        entries
            .iter()
            .find(|entry| entry.get(id_field) == Some(id))
            .cloned()
    };

    ids.into_iter()
        .filter_map(|id| {
            let old_value = find(old_entries, id).or_else(|| placeholder(id))?;
            let new_value = find(new_entries, id).or_else(|| placeholder(id))?;
            (old_value != new_value).then(|| (id.clone(), old_value, new_value))
        })
        .collect()
}

pub fn diff_window_queues(change: &ValueChange) -> Vec<QueueEvent> {
    diff_collection(change, "windowId", |id| {
        let queue = WindowQueue::new(id.as_i64()?);
        serde_json::to_value(queue).ok()
    })
    .into_iter()
    .filter_map(|(id, old_value, new_value)| {
        Some(QueueEvent::WindowQueueChanged {
            window_id: id.as_i64()?,
            old_value,
            new_value,
        })
    })
    .collect()
}

pub fn diff_saved_queues(change: &ValueChange) -> Vec<QueueEvent> {
    diff_collection(change, "key", |id| {
        let queue = SavedQueue::new(id.as_str()?, Vec::new());
        serde_json::to_value(queue).ok()
    })
    .into_iter()
    .filter_map(|(id, old_value, new_value)| {
        Some(QueueEvent::SavedQueueChanged {
            key: id.as_str()?.to_string(),
            old_value,
            new_value,
        })
    })
    .collect()
}

/// Events for every queue collection touched by one write
pub fn diff_changes(changes: &StoreChanges) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    if let Some(change) = changes.get(keys::WINDOW_QUEUES) {
        events.extend(diff_window_queues(change));
    }
    if let Some(change) = changes.get(keys::SAVED_QUEUES) {
        events.extend(diff_saved_queues(change));
    }
    events
}

/// Forwards per-entity events derived from store notifications
pub struct Reconciler {
    changes: broadcast::Receiver<StoreChanges>,
}

impl Reconciler {
    /// Subscribe now so no write after this call is missed
    pub fn new(store: &dyn KeyValueStore) -> Self {
        Self {
            changes: store.subscribe(),
        }
    }

    /// Run until shutdown, the store closes, or the sink is dropped
    pub async fn run(mut self, sink: mpsc::Sender<QueueEvent>, mut shutdown: ShutdownToken) {
        info!("Reconciler started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                received = self.changes.recv() => match received {
                    Ok(changes) => {
                        for event in diff_changes(&changes) {
                            debug!(?event, "Queue changed");
                            if sink.send(event).await.is_err() {
                                info!("Reconciler sink closed");
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reconciler lagged behind store notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("Reconciler stopped");
    }
}
