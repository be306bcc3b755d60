//! Locally defined capabilities.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::context::InvocationContext;
use crate::error::Result;

/// Type alias for a boxed async capability function.
pub type FunctionHandler =
    Arc<dyn Fn(InvocationContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A capability backed by an async closure in this process.
///
/// The closure runs under the invocation context, so cancellation and
/// deadlines apply to it like to any remote call.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    func: FunctionHandler,
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("func", &"<fn>")
            .finish()
    }
}

impl FunctionTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(InvocationContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            func: Arc::new(move |ctx, args| Box::pin(func(ctx, args))),
        }
    }

    /// Builder: set the argument schema.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[async_trait]
impl Capability for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, ctx: &InvocationContext, args: Value) -> Result<Value> {
        ctx.run((self.func)(ctx.clone(), args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invoke() {
        let echo = FunctionTool::new("echo", "Echoes its input", |_ctx, args| async move {
            Ok(json!({"echo": args}))
        })
        .with_parameters(json!({"type": "object", "properties": {"text": {"type": "string"}}}));

        assert_eq!(echo.declaration().parameters["properties"]["text"]["type"], "string");
        let out = echo
            .invoke(&InvocationContext::new(), json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"echo": {"text": "hi"}}));
    }

    #[tokio::test]
    async fn test_deadline_applies() {
        let slow = FunctionTool::new("slow", "Sleeps", |_ctx, _args| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        });
        let ctx = InvocationContext::new().with_timeout(Duration::from_millis(20));
        let err = slow.invoke(&ctx, json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::DeadlineExceeded));
    }
}
