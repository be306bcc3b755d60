//! Model Context Protocol (MCP) integration.
//!
//! The client side discovers and calls tools on a remote toolset over the
//! streamable HTTP transport, authenticated like any other peer call. The
//! server side is a small streamable-HTTP server used for the demo time
//! toolset and in tests.

pub mod client;
pub mod config;
pub mod filters;
pub mod server;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::McpToolsetConfig;
pub use filters::{create_static_tool_filter, StaticToolFilter, ToolFilter};
pub use server::{time_server, McpServer};
pub use transport::{McpTransport, StreamableHttpTransport, DEFAULT_ENDPOINT};
pub use types::{CallToolResult, McpToolDefinition, PROTOCOL_VERSION};
