//! MCP client with session management.
//!
//! An [`McpClient`] performs the `initialize` handshake lazily and then
//! serves tool discovery and tool calls over the same transport. When the
//! server forgets the session the handshake is run again.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::transport::McpTransport;
use super::types::{
    CallToolResult, Implementation, InitializeResult, ListToolsResult, McpToolDefinition,
    PROTOCOL_VERSION,
};
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};
use crate::jsonrpc::{RequestIds, RpcRequest};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on `tools/list` pages followed during discovery.
pub const MCP_MAX_LIST_PAGES: usize = 64;

// ---------------------------------------------------------------------------
// McpClient
// ---------------------------------------------------------------------------

/// Client for one MCP server.
///
/// Safe to share across tasks; concurrent first calls share a single
/// `initialize` handshake.
pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    ids: RequestIds,
    client_info: Implementation,
    server: RwLock<Option<Arc<InitializeResult>>>,
    handshake_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.transport.server_identifier())
            .field("initialized", &self.connected())
            .finish()
    }
}

impl McpClient {
    pub fn new(transport: Arc<dyn McpTransport>) -> Self {
        Self {
            transport,
            ids: RequestIds::default(),
            client_info: Implementation::bridge(),
            server: RwLock::new(None),
            handshake_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn server_identifier(&self) -> String {
        self.transport.server_identifier()
    }

    /// Whether the handshake has completed.
    pub fn connected(&self) -> bool {
        self.server.read().is_some()
    }

    /// Run the `initialize` handshake if there is no live session.
    pub async fn initialize(&self, ctx: &InvocationContext) -> Result<Arc<InitializeResult>> {
        if let Some(server) = self.cached() {
            return Ok(server);
        }
        let _guard = ctx.run(async { Ok(self.handshake_lock.lock().await) }).await?;
        // Another task may have finished the handshake while we waited.
        if let Some(server) = self.cached() {
            return Ok(server);
        }
        let server = Arc::new(self.handshake(ctx).await?);
        *self.server.write() = Some(server.clone());
        Ok(server)
    }

    /// End the session with the server. The next call handshakes again.
    pub async fn close(&self, ctx: &InvocationContext) -> Result<()> {
        let _guard = ctx.run(async { Ok(self.handshake_lock.lock().await) }).await?;
        let had_session = self.server.write().take().is_some();
        if !had_session {
            return Ok(());
        }
        log::info!("Closing MCP session with {}", self.server_identifier());
        self.transport.close(ctx).await
    }

    fn cached(&self) -> Option<Arc<InitializeResult>> {
        self.server.read().clone()
    }

    /// Forget `stale` unless a newer handshake already replaced it.
    fn invalidate(&self, stale: &Arc<InitializeResult>) {
        let mut server = self.server.write();
        if server.as_ref().map_or(false, |current| Arc::ptr_eq(current, stale)) {
            *server = None;
        }
    }

    /// Issue `method` inside the session, re-initializing once if the server
    /// reports the session as expired. The server rejects such a request
    /// before executing it, so sending it again is safe.
    async fn session_rpc<T: DeserializeOwned>(
        &self,
        ctx: &InvocationContext,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let server = self.initialize(ctx).await?;
        match self.rpc(ctx, method, params.clone()).await {
            Err(BridgeError::SessionExpired { peer }) => {
                log::info!("Re-initializing expired MCP session with {}", peer);
                self.invalidate(&server);
                self.initialize(ctx).await?;
                self.rpc(ctx, method, params).await
            }
            other => other,
        }
    }

    async fn handshake(&self, ctx: &InvocationContext) -> Result<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": self.client_info,
        });
        let result: InitializeResult = self.rpc(ctx, "initialize", params).await?;
        if result.protocol_version != PROTOCOL_VERSION {
            log::warn!(
                "MCP server {} negotiated protocol {} (requested {})",
                self.server_identifier(),
                result.protocol_version,
                PROTOCOL_VERSION
            );
        }
        self.transport.set_protocol_version(&result.protocol_version);
        self.transport
            .notify(ctx, RpcRequest::notification("notifications/initialized"))
            .await?;

        log::info!(
            "Connected to MCP server '{}' {} at {}",
            result.server_info.name,
            result.server_info.version,
            self.server_identifier()
        );
        Ok(result)
    }

    /// List every tool the server offers, following `nextCursor`.
    pub async fn list_tools(&self, ctx: &InvocationContext) -> Result<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MCP_MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let page: ListToolsResult = self.session_rpc(ctx, "tools/list", params).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(BridgeError::decode(
                            self.server_identifier(),
                            format!("tools/list repeated cursor '{}'", next),
                        ));
                    }
                    cursor = Some(next);
                }
                _ => {
                    log::debug!(
                        "Discovered {} tools on {}",
                        tools.len(),
                        self.server_identifier()
                    );
                    return Ok(tools);
                }
            }
        }
        Err(BridgeError::decode(
            self.server_identifier(),
            format!("tools/list exceeded {} pages", MCP_MAX_LIST_PAGES),
        ))
    }

    /// Call `name` with `arguments`.
    ///
    /// A JSON-RPC error is reported as `Invocation` for the tool. A result
    /// flagged `isError` is returned as-is; interpreting it is left to the
    /// caller.
    pub async fn call_tool(
        &self,
        ctx: &InvocationContext,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult> {
        let params = json!({"name": name, "arguments": arguments});
        self.session_rpc(ctx, "tools/call", params)
            .await
            .map_err(|e| match e {
                BridgeError::Invocation { message, .. } => BridgeError::invocation(name, message),
                other => other,
            })
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        ctx: &InvocationContext,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let request = RpcRequest::new(self.ids.next(), method, params);
        let response = self.transport.request(ctx, request).await?;
        let result = response
            .into_result()
            .map_err(|e| BridgeError::invocation(self.server_identifier(), e.to_string()))?;
        serde_json::from_value(result).map_err(|e| BridgeError::decode(self.server_identifier(), e))
    }
}
