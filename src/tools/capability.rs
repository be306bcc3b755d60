//! The uniform capability surface the orchestrator dispatches to.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::InvocationContext;
use crate::error::Result;

/// What the reasoning loop is told about a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

/// A named, described, invocable unit of work.
///
/// Remote peers, toolset tools and local functions all implement this, so
/// the orchestrator never needs to know what backs a capability. Names are
/// fixed at construction.
#[async_trait]
pub trait Capability: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments the capability accepts.
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    /// Run the capability. Arguments are forwarded without validation.
    async fn invoke(&self, ctx: &InvocationContext, args: Value) -> Result<Value>;

    fn declaration(&self) -> CapabilityDeclaration {
        CapabilityDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}
