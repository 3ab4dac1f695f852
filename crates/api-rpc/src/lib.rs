//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server exposing queue, configuration and
//! browser-session operations. Every queue mutation goes through the
//! transaction client.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
