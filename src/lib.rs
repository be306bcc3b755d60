//! # a2a-bridge
//!
//! Discovers remote peer agents over the A2A protocol and tools on MCP
//! servers, authenticates every call with an audience-scoped identity token,
//! and composes them as named capabilities for an orchestrating agent.
//!
//! The pieces, bottom-up:
//!
//! - [`auth`]: identity tokens, per-audience credential caching and the
//!   interceptor that attaches them.
//! - [`transport`]: the interceptor-equipped HTTP client.
//! - [`a2a`]: agent card discovery and the peer proxy.
//! - [`mcp`]: the streamable HTTP MCP client (and a demo server).
//! - [`tools`]: capability adapters over peers, MCP tools and local functions.
//! - [`orchestrator`]: composition, registration and the turn loop.
//! - [`server`]: the orchestrator HTTP surface.

pub mod a2a;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod jsonrpc;
pub mod mcp;
pub mod orchestrator;
pub mod server;
pub mod tools;
pub mod transport;

#[cfg(test)]
mod testing;

pub use a2a::{fetch_agent_card, A2AClient, AgentCard};
pub use auth::{Audience, CredentialStore, IdToken, IdTokenIssuer};
pub use config::BridgeConfig;
pub use context::InvocationContext;
pub use error::{AuthError, BridgeError, Result};
pub use mcp::{McpClient, McpToolsetConfig};
pub use orchestrator::{
    register_mcp_toolset, register_remote_agents, Orchestrator, RegistrationOptions,
    RegistrationPolicy,
};
pub use tools::{AgentTool, Capability, FunctionTool, McpTool, McpToolset};

/// Library version, also reported to MCP servers and on `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
