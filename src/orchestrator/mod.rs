//! Composition of capabilities behind a single decision loop.
//!
//! An [`Orchestrator`] holds an ordered, name-unique set of capabilities.
//! A [`Reasoner`] (the model-facing loop, external to this crate) is shown
//! their declarations and decides, step by step, which to invoke. Calls
//! chosen in one step run concurrently.

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};
use crate::tools::{Capability, CapabilityDeclaration};

pub use registry::{
    register_mcp_toolset, register_remote_agent, register_remote_agents, RegistrationOptions,
    RegistrationPolicy, RegistrationReport, SkippedPeer,
};

/// Default bound on decision steps per turn.
pub const DEFAULT_MAX_STEPS: usize = 10;

// ---------------------------------------------------------------------------
// Turn model
// ---------------------------------------------------------------------------

/// One capability invocation requested by the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of one [`ToolCall`], fed back to the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What the reasoner wants next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Invoke(Vec<ToolCall>),
    Respond(String),
}

/// Conversation entries visible to the reasoner during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnMessage {
    User { content: String },
    ToolCalls { calls: Vec<ToolCall> },
    ToolResults { outcomes: Vec<ToolOutcome> },
    Assistant { content: String },
}

/// The decision-making loop the orchestrator delegates choices to.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(
        &self,
        ctx: &InvocationContext,
        capabilities: &[CapabilityDeclaration],
        history: &[TurnMessage],
    ) -> Result<Decision>;
}

/// Outcome of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response: String,
    pub steps: usize,
    pub history: Vec<TurnMessage>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    capabilities: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
    reasoner: Option<Arc<dyn Reasoner>>,
    max_steps: usize,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("capabilities", &self.names())
            .field("reasoner", &self.reasoner.as_ref().map(|_| "<reasoner>"))
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl Orchestrator {
    /// Compose `capabilities`, preserving order.
    ///
    /// Fails with `DuplicateCapability` if two share a name.
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Result<Self> {
        let mut index = HashMap::with_capacity(capabilities.len());
        for (i, capability) in capabilities.iter().enumerate() {
            if index.insert(capability.name().to_string(), i).is_some() {
                return Err(BridgeError::DuplicateCapability {
                    name: capability.name().to_string(),
                });
            }
        }
        Ok(Self {
            capabilities,
            index,
            reasoner: None,
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    /// Declarations in registration order.
    pub fn declarations(&self) -> Vec<CapabilityDeclaration> {
        self.capabilities.iter().map(|c| c.declaration()).collect()
    }

    /// Invoke the capability registered as `name`.
    pub async fn invoke(&self, ctx: &InvocationContext, name: &str, args: Value) -> Result<Value> {
        let capability = self.get(name).ok_or_else(|| BridgeError::UnknownCapability {
            name: name.to_string(),
        })?;
        log::debug!("Invoking capability '{}'", name);
        capability.invoke(ctx, args).await
    }

    /// Drive the reasoner until it responds.
    ///
    /// Invocation failures are reported back to the reasoner as tool
    /// errors. Unknown capabilities, authentication failures and
    /// cancellation end the turn with that error.
    pub async fn run_turn(&self, ctx: &InvocationContext, input: &str) -> Result<TurnResult> {
        let reasoner = self
            .reasoner
            .as_ref()
            .ok_or_else(|| BridgeError::Config("orchestrator has no reasoner".into()))?;
        let declarations = self.declarations();
        let mut history = vec![TurnMessage::User {
            content: input.to_string(),
        }];

        for step in 1..=self.max_steps {
            let decision = ctx
                .run(reasoner.decide(ctx, &declarations, &history))
                .await?;

            let calls = match decision {
                Decision::Respond(response) => {
                    history.push(TurnMessage::Assistant {
                        content: response.clone(),
                    });
                    return Ok(TurnResult {
                        response,
                        steps: step,
                        history,
                    });
                }
                Decision::Invoke(calls) => calls,
            };

            log::debug!("Step {}: invoking {} capabilities", step, calls.len());
            let outcomes = self.run_step(ctx, &calls).await?;
            history.push(TurnMessage::ToolCalls { calls });
            history.push(TurnMessage::ToolResults { outcomes });
        }

        Err(BridgeError::Invocation {
            capability: "orchestrator".into(),
            message: format!("turn exceeded {} steps without a response", self.max_steps),
        })
    }

    async fn run_step(&self, ctx: &InvocationContext, calls: &[ToolCall]) -> Result<Vec<ToolOutcome>> {
        let results = join_all(
            calls
                .iter()
                .map(|call| self.invoke(ctx, &call.name, call.arguments.clone())),
        )
        .await;

        let mut outcomes = Vec::with_capacity(calls.len());
        for (call, result) in calls.iter().zip(results) {
            let outcome = match result {
                Ok(output) => ToolOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    output: Some(output),
                    error: None,
                },
                Err(err) if err.is_fatal_to_turn() => {
                    log::warn!("Capability '{}' ended the turn: {}", call.name, err);
                    return Err(err);
                }
                Err(err) => {
                    log::info!("Capability '{}' failed: {}", call.name, err);
                    ToolOutcome {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        output: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    fn echo(name: &str) -> Arc<dyn Capability> {
        Arc::new(FunctionTool::new(name, format!("{name} capability"), |_ctx, args| async move {
            Ok(json!({"echo": args}))
        }))
    }

    fn failing(name: &str) -> Arc<dyn Capability> {
        let owned = name.to_string();
        Arc::new(FunctionTool::new(name, "always fails", move |_ctx, _args| {
            let owned = owned.clone();
            async move { Err(BridgeError::invocation(owned, "peer said no")) }
        }))
    }

    fn sleepy(name: &str) -> Arc<dyn Capability> {
        Arc::new(FunctionTool::new(name, "sleeps", |_ctx, _args| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!("rested"))
        }))
    }

    /// Replays a fixed script of decisions and records what it was shown.
    struct Scripted {
        decisions: Mutex<VecDeque<Decision>>,
        seen: Mutex<Vec<Vec<TurnMessage>>>,
    }

    impl Scripted {
        fn new(decisions: Vec<Decision>) -> Arc<Self> {
            Arc::new(Self {
                decisions: Mutex::new(decisions.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Reasoner for Scripted {
        async fn decide(
            &self,
            _ctx: &InvocationContext,
            _capabilities: &[CapabilityDeclaration],
            history: &[TurnMessage],
        ) -> Result<Decision> {
            self.seen.lock().push(history.to_vec());
            Ok(self
                .decisions
                .lock()
                .pop_front()
                .unwrap_or_else(|| Decision::Invoke(vec![ToolCall::new("a", json!({}))])))
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Orchestrator::new(vec![echo("time_agent"), echo("time_agent")]).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateCapability { name } if name == "time_agent"));
    }

    #[test]
    fn test_declarations_keep_order() {
        let orch = Orchestrator::new(vec![echo("b"), echo("a"), echo("c")]).unwrap();
        let names: Vec<_> = orch.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(orch.declarations()[0].description, "b capability");
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let orch = Orchestrator::new(vec![echo("a")]).unwrap();
        let err = orch
            .invoke(&InvocationContext::new(), "weather_agent", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownCapability { name } if name == "weather_agent"));
    }

    #[tokio::test]
    async fn test_turn_invokes_then_responds() {
        let reasoner = Scripted::new(vec![
            Decision::Invoke(vec![
                ToolCall::new("a", json!({"city": "london"})),
                ToolCall::new("broken", json!({})),
            ]),
            Decision::Respond("It is 10.30am in London".into()),
        ]);
        let orch = Orchestrator::new(vec![echo("a"), failing("broken")])
            .unwrap()
            .with_reasoner(reasoner.clone());

        let turn = orch
            .run_turn(&InvocationContext::new(), "what time is it in london?")
            .await
            .unwrap();
        assert_eq!(turn.response, "It is 10.30am in London");
        assert_eq!(turn.steps, 2);

        let seen = reasoner.seen.lock();
        match &seen[1][2] {
            TurnMessage::ToolResults { outcomes } => {
                assert_eq!(outcomes[0].output, Some(json!({"echo": {"city": "london"}})));
                assert!(outcomes[1].is_error());
                assert!(outcomes[1].error.as_deref().unwrap().contains("peer said no"));
            }
            other => panic!("unexpected history entry: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_choice_aborts_turn() {
        let reasoner = Scripted::new(vec![Decision::Invoke(vec![ToolCall::new(
            "weather_agent",
            json!({}),
        )])]);
        let orch = Orchestrator::new(vec![echo("a")]).unwrap().with_reasoner(reasoner);
        let err = orch
            .run_turn(&InvocationContext::new(), "weather?")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownCapability { .. }));
    }

    #[tokio::test]
    async fn test_step_calls_run_concurrently() {
        let reasoner = Scripted::new(vec![
            Decision::Invoke((0..5).map(|i| ToolCall::new(format!("s{i}"), json!({}))).collect()),
            Decision::Respond("done".into()),
        ]);
        let caps = (0..5).map(|i| sleepy(&format!("s{i}"))).collect();
        let orch = Orchestrator::new(caps).unwrap().with_reasoner(reasoner);

        let started = Instant::now();
        orch.run_turn(&InvocationContext::new(), "go").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_max_steps() {
        let reasoner = Scripted::new(vec![]);
        let orch = Orchestrator::new(vec![echo("a")])
            .unwrap()
            .with_reasoner(reasoner)
            .with_max_steps(3);
        let err = orch
            .run_turn(&InvocationContext::new(), "loop forever")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_turn() {
        let reasoner = Scripted::new(vec![Decision::Respond("never".into())]);
        let orch = Orchestrator::new(vec![echo("a")]).unwrap().with_reasoner(reasoner);
        let ctx = InvocationContext::new();
        ctx.cancel();
        let err = orch.run_turn(&ctx, "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
    }

    #[tokio::test]
    async fn test_turn_without_reasoner() {
        let orch = Orchestrator::new(vec![echo("a")]).unwrap();
        let err = orch
            .run_turn(&InvocationContext::new(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
