//! MCP toolset tools as capabilities.
//!
//! [`McpToolset`] discovers a server's tools once; every resulting
//! [`McpTool`] shares the toolset's client, session and credentials.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::auth::{Audience, CredentialStore};
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};
use crate::mcp::client::McpClient;
use crate::mcp::config::McpToolsetConfig;
use crate::mcp::filters::ToolFilter;
use crate::mcp::transport::StreamableHttpTransport;
use crate::mcp::types::McpToolDefinition;
use crate::transport::AuthorizedClient;

// ---------------------------------------------------------------------------
// McpToolset
// ---------------------------------------------------------------------------

pub struct McpToolset {
    client: Arc<McpClient>,
    filter: Option<ToolFilter>,
}

impl fmt::Debug for McpToolset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpToolset")
            .field("client", &self.client)
            .field("filter", &self.filter.as_ref().map(|_| "<filter>"))
            .finish()
    }
}

impl McpToolset {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self {
            client,
            filter: None,
        }
    }

    /// Toolset over streamable HTTP, authenticated for the config's host.
    pub fn from_config(store: &CredentialStore, config: &McpToolsetConfig) -> Result<Self> {
        let host = config.host_url()?;
        let http = AuthorizedClient::new(store, Audience::from_url(&host))?;
        Self::with_client(http, config)
    }

    /// Toolset over streamable HTTP using an already configured client.
    ///
    /// The client's audience must be the config's host.
    pub fn with_client(http: AuthorizedClient, config: &McpToolsetConfig) -> Result<Self> {
        let host = config.host_url()?;
        let transport = StreamableHttpTransport::new(http, &host, &config.endpoint)?;
        let toolset = Self::new(Arc::new(McpClient::new(Arc::new(transport))));
        Ok(match config.filter() {
            Some(filter) => toolset.with_filter(filter),
            None => toolset,
        })
    }

    /// Builder: only expose tools the filter accepts.
    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    /// Handshake, list every tool and wrap each accepted one.
    pub async fn discover(&self, ctx: &InvocationContext) -> Result<Vec<McpTool>> {
        let definitions = self.client.list_tools(ctx).await?;
        let total = definitions.len();
        let tools: Vec<McpTool> = definitions
            .into_iter()
            .filter(|d| self.filter.as_ref().map_or(true, |f| f(d)))
            .map(|definition| McpTool::new(definition, Arc::clone(&self.client)))
            .collect();

        if tools.len() < total {
            log::debug!(
                "Tool filter kept {} of {} tools from {}",
                tools.len(),
                total,
                self.client.server_identifier()
            );
        }
        Ok(tools)
    }
}

// ---------------------------------------------------------------------------
// McpTool
// ---------------------------------------------------------------------------

/// One tool on an MCP server.
pub struct McpTool {
    definition: McpToolDefinition,
    description: String,
    client: Arc<McpClient>,
}

impl fmt::Debug for McpTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.definition.name)
            .field("server", &self.client.server_identifier())
            .finish()
    }
}

impl McpTool {
    pub fn new(definition: McpToolDefinition, client: Arc<McpClient>) -> Self {
        let description = definition
            .description
            .clone()
            .or_else(|| definition.title.clone())
            .unwrap_or_else(|| {
                format!("Tool {} from {}", definition.name, client.server_identifier())
            });
        Self {
            definition,
            description,
            client,
        }
    }

    pub fn definition(&self) -> &McpToolDefinition {
        &self.definition
    }
}

#[async_trait]
impl Capability for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn invoke(&self, ctx: &InvocationContext, args: Value) -> Result<Value> {
        let result = self.client.call_tool(ctx, self.name(), args).await?;
        let text = result.joined_text();

        if result.is_error {
            let message = if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            };
            return Err(BridgeError::invocation(self.name(), message));
        }

        let mut out = json!({"content": result.content, "text": text});
        if let Some(structured) = result.structured_content {
            out["structuredContent"] = structured;
        }
        Ok(out)
    }
}
