//! Remote peer agents as capabilities.
//!
//! An [`AgentTool`] forwards its arguments to a peer as a task and hands
//! back either the peer's raw result or a condensed summary of it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::a2a::client::A2AClient;
use crate::a2a::types::TaskResult;
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

/// Condenses a peer result before it is returned to the reasoning loop.
#[async_trait]
pub trait ResultSummarizer: Send + Sync {
    async fn summarize(
        &self,
        ctx: &InvocationContext,
        agent: &str,
        result: &TaskResult,
    ) -> Result<Value>;
}

/// Joins the text of a result into `{"result": text}`.
#[derive(Debug, Clone, Default)]
pub struct TextSummarizer;

#[async_trait]
impl ResultSummarizer for TextSummarizer {
    async fn summarize(
        &self,
        _ctx: &InvocationContext,
        _agent: &str,
        result: &TaskResult,
    ) -> Result<Value> {
        Ok(json!({"result": result.text()}))
    }
}

// ---------------------------------------------------------------------------
// AgentTool
// ---------------------------------------------------------------------------

/// A peer agent, named and described by its agent card.
pub struct AgentTool {
    client: Arc<A2AClient>,
    description: String,
    skip_summarization: bool,
    summarizer: Arc<dyn ResultSummarizer>,
}

impl fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.client.name())
            .field("endpoint", &self.client.endpoint().as_str())
            .field("skip_summarization", &self.skip_summarization)
            .finish()
    }
}

impl AgentTool {
    pub fn new(client: Arc<A2AClient>) -> Self {
        let card = client.card();
        let description = if card.description.trim().is_empty() {
            format!("Remote agent {}", card.name)
        } else {
            card.description.clone()
        };
        Self {
            client,
            description,
            skip_summarization: false,
            summarizer: Arc::new(TextSummarizer),
        }
    }

    /// Builder: return the peer's result verbatim.
    pub fn with_skip_summarization(mut self, skip: bool) -> Self {
        self.skip_summarization = skip;
        self
    }

    /// Builder: replace the default [`TextSummarizer`].
    pub fn with_summarizer(mut self, summarizer: Arc<dyn ResultSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn skip_summarization(&self) -> bool {
        self.skip_summarization
    }

    pub fn client(&self) -> &Arc<A2AClient> {
        &self.client
    }
}

#[async_trait]
impl Capability for AgentTool {
    fn name(&self) -> &str {
        self.client.name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": format!("The request to send to {}", self.client.name())
                }
            }
        })
    }

    async fn invoke(&self, ctx: &InvocationContext, args: Value) -> Result<Value> {
        let task = match request_text(&args) {
            Some(text) => Value::String(text),
            None => args,
        };
        let result = self.client.execute_task(ctx, &task).await?;
        if let Some(failure) = result.failure() {
            return Err(BridgeError::invocation(self.name(), failure));
        }

        if self.skip_summarization {
            return serde_json::to_value(&result).map_err(|e| BridgeError::decode(self.name(), e));
        }
        self.summarizer.summarize(ctx, self.name(), &result).await
    }
}

/// The `request` string when `args` has exactly the advertised shape.
fn request_text(args: &Value) -> Option<String> {
    let fields = args.as_object().filter(|fields| fields.len() == 1)?;
    fields.get("request")?.as_str().map(str::to_string)
}
