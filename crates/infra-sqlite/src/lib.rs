// TabQueue Infrastructure - SQLite Adapter
// Implements: KeyValueStore

mod connection;
mod kv_store;
mod migration;

pub use connection::create_pool;
pub use kv_store::SqliteKeyValueStore;
pub use migration::{run_migrations, SCHEMA_VERSION};
