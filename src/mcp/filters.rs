//! Tool filtering for MCP toolsets.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::McpToolDefinition;

/// Predicate deciding whether a discovered tool is exposed.
pub type ToolFilter = Arc<dyn Fn(&McpToolDefinition) -> bool + Send + Sync>;

/// Static tool filter with allow/block lists.
///
/// Blocked names take precedence. An empty allow list allows everything
/// not blocked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticToolFilter {
    #[serde(default)]
    pub allowed_tool_names: HashSet<String>,
    #[serde(default)]
    pub blocked_tool_names: HashSet<String>,
}

impl StaticToolFilter {
    pub fn new(
        allowed_tool_names: Option<Vec<String>>,
        blocked_tool_names: Option<Vec<String>>,
    ) -> Self {
        Self {
            allowed_tool_names: allowed_tool_names
                .unwrap_or_default()
                .into_iter()
                .collect(),
            blocked_tool_names: blocked_tool_names
                .unwrap_or_default()
                .into_iter()
                .collect(),
        }
    }

    /// Whether neither list restricts anything.
    pub fn is_empty(&self) -> bool {
        self.allowed_tool_names.is_empty() && self.blocked_tool_names.is_empty()
    }

    pub fn filter(&self, tool: &McpToolDefinition) -> bool {
        if self.blocked_tool_names.contains(&tool.name) {
            return false;
        }
        if !self.allowed_tool_names.is_empty() {
            return self.allowed_tool_names.contains(&tool.name);
        }
        true
    }

    pub fn into_tool_filter(self) -> ToolFilter {
        Arc::new(move |tool: &McpToolDefinition| self.filter(tool))
    }
}

/// Shorthand for a [`StaticToolFilter`] as a [`ToolFilter`].
pub fn create_static_tool_filter(
    allowed_tool_names: Option<Vec<String>>,
    blocked_tool_names: Option<Vec<String>>,
) -> ToolFilter {
    StaticToolFilter::new(allowed_tool_names, blocked_tool_names).into_tool_filter()
}
