//! Daemon configuration read from the environment

use std::time::Duration;
use tabqueue_api_rpc::server::DEFAULT_RPC_PORT;
use tabqueue_core::application::transaction::constants::TRANSACTION_TIMEOUT;

const DEFAULT_DB_PATH: &str = "~/.tabqueue/store.db";

pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_port: u16,
    pub transaction_timeout: Duration,
    pub json_logs: bool,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("TABQUEUE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let rpc_port = lookup("TABQUEUE_RPC_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RPC_PORT);

        let transaction_timeout = lookup("TABQUEUE_TRANSACTION_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(TRANSACTION_TIMEOUT);

        let json_logs = lookup("TABQUEUE_LOG_FORMAT").is_some_and(|format| format == "json");

        Self {
            db_path: shellexpand::tilde(&db_path).into_owned(),
            rpc_port,
            transaction_timeout,
            json_logs,
        }
    }
}
