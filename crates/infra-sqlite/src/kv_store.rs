// SQLite KeyValueStore Implementation

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tabqueue_core::error::{AppError, Result};
use tabqueue_core::port::store::{collect_changes, CHANGE_CHANNEL_CAPACITY};
use tabqueue_core::port::{KeyValueStore, StoreChanges, StoreValues, TimeProvider};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite error codes: https://www.sqlite.org/rescode.html
            Some(code) if code.as_ref() == "5" => {
                AppError::Store(format!("Database locked (SQLITE_BUSY): {}", db_err.message()))
            }
            Some(code) if code.as_ref() == "13" => {
                AppError::Store(format!("Database full: {}", db_err.message()))
            }
            Some(code) => AppError::Store(format!(
                "Database error [{}]: {}",
                code.as_ref(),
                db_err.message()
            )),
            None => AppError::Store(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Store("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Store(format!("Column not found: {}", col)),
        // Connection, pool, protocol errors
        _ => AppError::Store(err.to_string()),
    }
}

/// Store backed by the `kv_entries` table.
///
/// Writes are serialized inside the adapter so change notifications are
/// published in the order the writes were committed.
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<StoreChanges>,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            time_provider,
            write_lock: Mutex::new(()),
            changes,
        }
    }
}

/// Stored values of `keys`, read on one connection; absent keys are left out
async fn read_values<'k>(
    conn: &mut SqliteConnection,
    keys: impl IntoIterator<Item = &'k String>,
) -> Result<StoreValues> {
    let mut found = StoreValues::new();
    for key in keys {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        if let Some(raw) = raw {
            found.insert(key.clone(), serde_json::from_str::<Value>(&raw)?);
        }
    }
    Ok(found)
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, defaults: StoreValues) -> Result<StoreValues> {
        // One read transaction, so every key comes from the same snapshot
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut stored = read_values(&mut *tx, defaults.keys()).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(defaults
            .into_iter()
            .map(|(key, default)| {
                let value = stored.remove(&key).unwrap_or(default);
                (key, value)
            })
            .collect())
    }

    async fn set(&self, values: StoreValues) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let now = self.time_provider.now_millis();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let current = read_values(&mut *tx, values.keys()).await?;
        let changes = collect_changes(&current, &values);

        for (key, value) in &values {
            sqlx::query(
                r#"
                INSERT INTO kv_entries (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key.as_str())
            .bind(serde_json::to_string(value)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(keys = values.len(), changed = changes.len(), "Store write committed");
        if !changes.is_empty() {
            // No subscribers is fine
            let _ = self.changes.send(changes);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChanges> {
        self.changes.subscribe()
    }
}
