// Store Schema Setup
//
// The store is a single table, so its version is kept in SQLite's
// `user_version` header instead of a bookkeeping table.

use sqlx::SqlitePool;
use tracing::{debug, info};

/// Version written once `schema.sql` has been applied
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Bring the database up to `SCHEMA_VERSION`; a current database is left alone
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    if version >= SCHEMA_VERSION {
        debug!(version, "Store schema is current");
        return Ok(());
    }

    info!(from = version, to = SCHEMA_VERSION, "Creating store schema");
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(SCHEMA).execute(&mut *tx).await?;
    // PRAGMA takes no bound parameters
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
