//! Capability adapters.
//!
//! Every capability the orchestrator can choose implements [`Capability`]:
//! remote peer agents ([`AgentTool`]), tools discovered on an MCP toolset
//! ([`McpTool`]) and local functions ([`FunctionTool`]).

pub mod agent_tool;
pub mod capability;
pub mod function_tool;
pub mod mcp_tool;

pub use agent_tool::{AgentTool, ResultSummarizer, TextSummarizer};
pub use capability::{Capability, CapabilityDeclaration};
pub use function_tool::FunctionTool;
pub use mcp_tool::{McpTool, McpToolset};
