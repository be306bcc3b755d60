//! MCP toolset configuration.

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::filters::{StaticToolFilter, ToolFilter};
use super::transport::DEFAULT_ENDPOINT;
use crate::auth::parse_http_url;
use crate::error::Result;

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Where a toolset lives and which of its tools to expose.
///
/// ```rust
/// use a2a_bridge::mcp::config::McpToolsetConfig;
///
/// let config = McpToolsetConfig::new("https://time-tools.example.run.app")
///     .with_allowed_tools(vec!["get_current_time".into()]);
/// assert_eq!(config.endpoint, "/mcp");
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolsetConfig {
    /// Toolset host, e.g. `https://time-tools.example.run.app`.
    pub host: String,
    /// Path of the MCP endpoint on the host.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "StaticToolFilter::is_empty")]
    pub tool_filter: StaticToolFilter,
}

impl fmt::Debug for McpToolsetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpToolsetConfig")
            .field("host", &self.host)
            .field("endpoint", &self.endpoint)
            .field(
                "tool_filter",
                &(!self.tool_filter.is_empty()).then_some("<filter>"),
            )
            .finish()
    }
}

impl McpToolsetConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            endpoint: default_endpoint(),
            tool_filter: StaticToolFilter::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_allowed_tools(mut self, names: Vec<String>) -> Self {
        self.tool_filter.allowed_tool_names = names.into_iter().collect();
        self
    }

    pub fn with_blocked_tools(mut self, names: Vec<String>) -> Self {
        self.tool_filter.blocked_tool_names = names.into_iter().collect();
        self
    }

    pub fn host_url(&self) -> Result<Url> {
        parse_http_url(&self.host)
    }

    /// The configured filter, if any list is set.
    pub fn filter(&self) -> Option<ToolFilter> {
        (!self.tool_filter.is_empty()).then(|| self.tool_filter.clone().into_tool_filter())
    }

    /// Identifier for logging.
    pub fn server_identifier(&self) -> String {
        format!(
            "http:{}/{}",
            self.host.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}
