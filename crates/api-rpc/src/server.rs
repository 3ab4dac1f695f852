//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP, bound to localhost.

use crate::handler::RpcHandler;
use crate::types::{
    CloseTabRequest, CloseWindowRequest, DeployRequest, DequeueRequest, EnqueueRequest,
    GetConfigRequest, ListQueuesRequest, OpenTabRequest, OpenWindowRequest, RemoveItemRequest,
    RemoveSavedRequest, RenameSavedRequest, SaveAllRequest, SaveWindowRequest, SendLinkRequest,
    SendTabRequest, SendWindowRequest, SetItemRequest, SetSavedRequest, SetSharedConfigRequest,
    SetWindowConfigRequest, TabLoadedRequest, WindowsRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// Register `$method` forwarding parsed params to `handler.$call`.
///
/// The `optional` form accepts missing params and falls back to the
/// request type's default.
macro_rules! register {
    ($module:ident, $handler:expr, $method:literal => $call:ident($req:ty)) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $req = params.parse()?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
    ($module:ident, $handler:expr, $method:literal => $call:ident($req:ty), optional) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $req = params.parse::<Option<$req>>()?.unwrap_or_default();
                    handler.$call(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Security: Only binds to the configured host (127.0.0.1 by default)
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());
        let handler = &self.handler;

        // Queue operations
        register!(module, handler, "queues.list.v1" => list_queues(ListQueuesRequest), optional);
        register!(module, handler, "queues.enqueue.v1" => enqueue(EnqueueRequest));
        register!(module, handler, "queues.dequeue.v1" => dequeue(DequeueRequest));
        register!(module, handler, "queues.remove_item.v1" => remove_item(RemoveItemRequest));
        register!(module, handler, "queues.set_item.v1" => set_item(SetItemRequest));
        register!(module, handler, "queues.save_window.v1" => save_window(SaveWindowRequest));
        register!(module, handler, "queues.save_all.v1" => save_all(SaveAllRequest), optional);

        // Saved queues
        register!(module, handler, "saved.deploy.v1" => deploy(DeployRequest));
        register!(module, handler, "saved.rename.v1" => rename_saved(RenameSavedRequest));
        register!(module, handler, "saved.set.v1" => set_saved(SetSavedRequest));
        register!(module, handler, "saved.remove.v1" => remove_saved(RemoveSavedRequest));

        // Configuration
        register!(module, handler, "config.get.v1" => get_config(GetConfigRequest), optional);
        register!(module, handler, "config.set_shared.v1" => set_shared_config(SetSharedConfigRequest));
        register!(module, handler, "config.set_window.v1" => set_window_config(SetWindowConfigRequest));

        // Browser session
        register!(module, handler, "browser.windows.v1" => windows(WindowsRequest), optional);
        register!(module, handler, "browser.open_window.v1" => open_window(OpenWindowRequest), optional);
        register!(module, handler, "browser.open_tab.v1" => open_tab(OpenTabRequest));
        register!(module, handler, "browser.tab_loaded.v1" => tab_loaded(TabLoadedRequest));
        register!(module, handler, "browser.close_tab.v1" => close_tab(CloseTabRequest));
        register!(module, handler, "browser.close_window.v1" => close_window(CloseWindowRequest));
        register!(module, handler, "browser.send_tab.v1" => send_tab(SendTabRequest));
        register!(module, handler, "browser.send_window.v1" => send_window(SendWindowRequest));
        register!(module, handler, "browser.send_link.v1" => send_link(SendLinkRequest));

        info!(
            methods = module.method_names().count(),
            "JSON-RPC server started successfully"
        );

        let handle = server.start(module);
        Ok(handle)
    }
}
