//! A2A (Agent-to-Agent) protocol support.
//!
//! Discovery of a peer's agent card, the wire types it speaks, and the
//! client that delegates tasks to it over an authenticated transport.

pub mod card;
pub mod client;
pub mod errors;
pub mod types;

pub use card::{fetch_agent_card, AGENT_CARD_PATH};
pub use client::{A2AClient, TaskEventStream};
pub use errors::A2AErrorCode;
pub use types::{AgentCard, Message, Part, StreamEvent, Task, TaskResult, TaskState};
