//! A2A client for delegating tasks to a remote peer.
//!
//! An [`A2AClient`] pairs a fetched [`AgentCard`] with an
//! [`AuthorizedClient`] scoped to the peer's origin. Every call is a
//! JSON-RPC 2.0 POST to the card's endpoint.

use futures::stream::{BoxStream, StreamExt};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::errors::describe;
use super::types::{AgentCard, Message, StreamEvent, Task, TaskResult};
use crate::auth::parse_http_url;
use crate::context::InvocationContext;
use crate::error::{AuthError, BridgeError, Result};
use crate::jsonrpc::{RequestIds, RpcRequest, RpcResponse};
use crate::transport::sse::event_stream;
use crate::transport::{AuthorizedClient, CallRequest};

/// Incremental task updates from `message/stream`.
pub type TaskEventStream = BoxStream<'static, Result<StreamEvent>>;

/// Proxy for one remote peer.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct A2AClient {
    card: AgentCard,
    endpoint: Url,
    client: AuthorizedClient,
    ids: RequestIds,
}

impl A2AClient {
    /// Bind `card` to `client`.
    ///
    /// Fails with `Config` when the card has no name or its endpoint lies
    /// outside the client's audience.
    pub fn new(card: AgentCard, client: AuthorizedClient) -> Result<Self> {
        if card.name.trim().is_empty() {
            return Err(BridgeError::Config(
                "agent card must carry a non-empty name".into(),
            ));
        }
        let endpoint = parse_http_url(&card.url)?;
        if !client.audience().matches(&endpoint) {
            return Err(BridgeError::Config(format!(
                "agent '{}' advertises endpoint {} outside its origin {}",
                card.name,
                endpoint,
                client.audience()
            )));
        }
        Ok(Self {
            card,
            endpoint,
            client,
            ids: RequestIds::default(),
        })
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    pub fn name(&self) -> &str {
        &self.card.name
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send `task` with `message/send` and wait for the result.
    pub async fn execute_task(&self, ctx: &InvocationContext, task: &Value) -> Result<TaskResult> {
        let message = Message::user_task(task);
        log::debug!(
            "Sending task to '{}' (message {})",
            self.card.name,
            message.message_id
        );
        let params = json!({
            "message": message,
            "configuration": {"blocking": true},
        });
        self.call("message/send", params, ctx).await
    }

    /// Send `task` with `message/stream` and return the event stream.
    ///
    /// The stream ends when the peer closes it, or with `Cancelled` /
    /// `DeadlineExceeded` when `ctx` fires.
    pub async fn execute_task_streaming(
        &self,
        ctx: &InvocationContext,
        task: &Value,
    ) -> Result<TaskEventStream> {
        if !self.card.capabilities.streaming {
            return Err(BridgeError::Config(format!(
                "agent '{}' does not support streaming",
                self.card.name
            )));
        }

        let request = RpcRequest::new(
            self.ids.next(),
            "message/stream",
            json!({"message": Message::user_task(task)}),
        );
        let response = self
            .post(ctx, request.to_value(), "text/event-stream")
            .await?;
        let response = self.check_status(ctx, response).await?;

        let peer = self.card.name.clone();
        let events = event_stream(response.bytes_stream(), peer.clone(), ctx.clone()).map(
            move |event| {
                let event = event?;
                decode_result::<StreamEvent>(&peer, &event.data)
            },
        );
        Ok(events.boxed())
    }

    /// Fetch the current state of a task.
    pub async fn get_task(&self, ctx: &InvocationContext, task_id: &str) -> Result<Task> {
        self.call("tasks/get", json!({"id": task_id}), ctx).await
    }

    /// Ask the peer to cancel a task.
    pub async fn cancel_task(&self, ctx: &InvocationContext, task_id: &str) -> Result<Task> {
        log::info!("Cancelling task {} on '{}'", task_id, self.card.name);
        self.call("tasks/cancel", json!({"id": task_id}), ctx).await
    }

    // -----------------------------------------------------------------------
    // JSON-RPC plumbing
    // -----------------------------------------------------------------------

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        ctx: &InvocationContext,
    ) -> Result<T> {
        let request = RpcRequest::new(self.ids.next(), method, params);
        let response = self
            .post(ctx, request.to_value(), "application/json")
            .await?;
        let response = self.check_status(ctx, response).await?;
        let body = self.client.read_text(ctx, response).await?;
        decode_result(&self.card.name, &body)
    }

    async fn post(
        &self,
        ctx: &InvocationContext,
        body: Value,
        accept: &str,
    ) -> Result<reqwest::Response> {
        let request = CallRequest::new(Method::POST, self.endpoint.clone())
            .with_header("accept", accept)
            .with_json(body);
        self.client.send(ctx, request).await
    }

    async fn check_status(
        &self,
        ctx: &InvocationContext,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                audience: self.client.audience().to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        let body = self.client.read_text(ctx, response).await.unwrap_or_default();
        Err(BridgeError::PeerRejected {
            peer: self.card.name.clone(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Decode a JSON-RPC response body, mapping a peer error to `Invocation`.
fn decode_result<T: DeserializeOwned>(peer: &str, body: &str) -> Result<T> {
    let response: RpcResponse =
        serde_json::from_str(body).map_err(|e| BridgeError::decode(peer, e))?;
    let result = response
        .into_result()
        .map_err(|e| BridgeError::invocation(peer, describe(&e)))?;
    serde_json::from_value(result).map_err(|e| BridgeError::decode(peer, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::card::fetch_agent_card;
    use crate::a2a::types::{Part, TaskState};
    use crate::auth::{Audience, CredentialStore};
    use crate::testing::{spawn_peer, spawn_peer_with, spawn_router, FakeIssuer};
    use axum::http::StatusCode as HttpStatus;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use std::sync::Arc;

    async fn connect(base: &str, issuer: Arc<FakeIssuer>) -> A2AClient {
        let base = Url::parse(base).unwrap();
        let store = CredentialStore::new(issuer);
        let client = AuthorizedClient::new(&store, Audience::from_url(&base)).unwrap();
        let card = fetch_agent_card(&client, &base, &InvocationContext::new())
            .await
            .unwrap();
        A2AClient::new(card, client).unwrap()
    }

    fn card(name: &str, url: &str) -> AgentCard {
        serde_json::from_value(json!({"name": name, "url": url})).unwrap()
    }

    #[tokio::test]
    async fn test_execute_task_forwards_payload() {
        let peer = spawn_peer("time_agent").await;
        let client = connect(&peer.base(), Arc::new(FakeIssuer::new())).await;

        let result = client
            .execute_task(&InvocationContext::new(), &json!({"city": "london"}))
            .await
            .unwrap();
        match result {
            TaskResult::Task(task) => {
                assert_eq!(task.status.state, TaskState::Completed);
                assert_eq!(task.artifacts[0].parts[0], Part::data(json!({"city": "london"})));
            }
            other => panic!("expected a task, got {other:?}"),
        }

        let calls = peer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body["method"], "message/send");
        assert!(calls[0]
            .authorization
            .as_deref()
            .unwrap()
            .starts_with("Bearer "));
    }

    #[tokio::test]
    async fn test_get_and_cancel_task() {
        let peer = spawn_peer("time_agent").await;
        let client = connect(&peer.base(), Arc::new(FakeIssuer::new())).await;
        let ctx = InvocationContext::new();

        let task = client.get_task(&ctx, "task-9").await.unwrap();
        assert_eq!(task.id, "task-9");
        let task = client.cancel_task(&ctx, "task-9").await.unwrap();
        assert_eq!(task.status.state, TaskState::Canceled);
    }

    #[tokio::test]
    async fn test_rpc_error_is_invocation_error() {
        let peer = spawn_peer_with(
            json!({"name": "time_agent", "capabilities": {"streaming": true}}),
            None,
        )
        .await;
        let client = connect(&peer.base(), Arc::new(FakeIssuer::new())).await;

        // The fake peer does not implement tasks/resubscribe.
        let err = client
            .call::<Value>("tasks/resubscribe", json!({}), &InvocationContext::new())
            .await
            .unwrap_err();
        match err {
            BridgeError::Invocation { capability, message } => {
                assert_eq!(capability, "time_agent");
                assert!(message.contains("-32601"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_new_rejects_empty_name_and_foreign_endpoint() {
        let store = CredentialStore::new(Arc::new(FakeIssuer::new()));
        let aud = Audience::parse("https://time.example.run.app").unwrap();
        let client = AuthorizedClient::new(&store, aud).unwrap();

        let err = A2AClient::new(card("", "https://time.example.run.app"), client.clone())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let err = A2AClient::new(card("time", "https://evil.example.com/rpc"), client.clone())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        assert!(A2AClient::new(card("time", "https://time.example.run.app/a2a"), client).is_ok());
    }

    #[tokio::test]
    async fn test_streaming_requires_capability() {
        let peer = spawn_peer("time_agent").await;
        let client = connect(&peer.base(), Arc::new(FakeIssuer::new())).await;
        let err = client
            .execute_task_streaming(&InvocationContext::new(), &json!("hi"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    async fn streaming_peer() -> String {
        let router = Router::new()
            .route(
                "/.well-known/agent-card.json",
                axum::routing::get(|| async {
                    axum::Json(json!({"name": "streamer", "capabilities": {"streaming": true}}))
                }),
            )
            .route(
                "/",
                post(|| async {
                    let working = json!({"jsonrpc": "2.0", "id": 1, "result": {
                        "kind": "status-update", "taskId": "t1", "contextId": "c1",
                        "status": {"state": "working"}, "final": false
                    }});
                    let done = json!({"jsonrpc": "2.0", "id": 1, "result": {
                        "kind": "status-update", "taskId": "t1", "contextId": "c1",
                        "status": {"state": "completed"}, "final": true
                    }});
                    let body = format!("data: {}\n\ndata: {}\n\n", working, done);
                    ([("content-type", "text/event-stream")], body).into_response()
                }),
            );
        format!("http://{}", spawn_router(router).await)
    }

    #[tokio::test]
    async fn test_streaming_yields_events() {
        let base = streaming_peer().await;
        let client = connect(&base, Arc::new(FakeIssuer::new())).await;
        let events: Vec<_> = client
            .execute_task_streaming(&InvocationContext::new(), &json!("what time is it?"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        let last = events[1].as_ref().unwrap();
        assert!(!first.is_final());
        assert!(last.is_final());
    }

    #[tokio::test]
    async fn test_unauthorized_call_is_auth_error() {
        let router = Router::new()
            .route(
                "/.well-known/agent-card.json",
                axum::routing::get(|| async { axum::Json(json!({"name": "strict"})) }),
            )
            .route("/", post(|| async { HttpStatus::UNAUTHORIZED }));
        let base = format!("http://{}", spawn_router(router).await);
        let issuer = Arc::new(FakeIssuer::new());
        let client = connect(&base, issuer.clone()).await;

        let err = client
            .execute_task(&InvocationContext::new(), &json!("hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Auth(AuthError::Rejected { status: 401, .. })
        ));

        // The 401 invalidated the cached token.
        let _ = client.execute_task(&InvocationContext::new(), &json!("hi")).await;
        assert_eq!(issuer.issued(), 2);
    }
}
