//! Test doubles shared by unit tests across the crate.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::auth::{Audience, IdToken, IdTokenIssuer};
use crate::error::AuthError;

// ---------------------------------------------------------------------------
// FakeIssuer
// ---------------------------------------------------------------------------

/// Mints unique opaque tokens and remembers which audience each was for.
pub(crate) struct FakeIssuer {
    counter: AtomicUsize,
    lifetime: Duration,
    delay: Option<std::time::Duration>,
    fail: bool,
    tokens: DashMap<String, (Audience, DateTime<Utc>)>,
}

impl FakeIssuer {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
            delay: None,
            fail: false,
            tokens: DashMap::new(),
        }
    }

    /// An issuer standing in for an environment with no credentials.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn issued(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub(crate) fn audience_of(&self, secret: &str) -> Option<Audience> {
        self.tokens.get(secret).map(|entry| entry.0.clone())
    }

    pub(crate) fn expiry_of(&self, secret: &str) -> Option<DateTime<Utc>> {
        self.tokens.get(secret).map(|entry| entry.1)
    }
}

#[async_trait]
impl IdTokenIssuer for FakeIssuer {
    async fn issue(&self, audience: &Audience) -> Result<IdToken, AuthError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AuthError::Issuance {
                audience: audience.to_string(),
                message: "no credentials in this environment".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let secret = format!("fake-token-{}-{}", n, uuid::Uuid::new_v4());
        let expires_at = Utc::now() + self.lifetime;
        self.tokens
            .insert(secret.clone(), (audience.clone(), expires_at));
        Ok(IdToken::new(secret, expires_at))
    }

    fn kind(&self) -> &'static str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// Local servers
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral localhost port.
pub(crate) async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A recorded inbound JSON-RPC call to a fake peer.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) authorization: Option<String>,
    pub(crate) body: Value,
}

#[derive(Clone)]
struct PeerState {
    card: Value,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    status: Option<StatusCode>,
}

/// A fake A2A peer: serves `card` and answers `message/send` with a
/// completed task whose artifact echoes the first message part.
pub(crate) struct FakePeer {
    pub(crate) addr: SocketAddr,
    pub(crate) calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakePeer {
    pub(crate) fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

/// Spawn a fake peer advertising `name`.
pub(crate) async fn spawn_peer(name: &str) -> FakePeer {
    spawn_peer_with(json!({
        "name": name,
        "description": format!("{} for tests", name),
        "skills": []
    }), None)
    .await
}

/// Spawn a fake peer that answers every request with `status`.
pub(crate) async fn spawn_rejecting_peer(status: StatusCode) -> FakePeer {
    spawn_peer_with(json!({"name": "unused"}), Some(status)).await
}

pub(crate) async fn spawn_peer_with(card: Value, status: Option<StatusCode>) -> FakePeer {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let state = PeerState {
        card,
        calls: calls.clone(),
        status,
    };
    let router = Router::new()
        .route("/.well-known/agent-card.json", get(peer_card))
        .route("/", post(peer_rpc))
        .with_state(state);
    let addr = spawn_router(router).await;
    FakePeer { addr, calls }
}

async fn peer_card(State(state): State<PeerState>) -> axum::response::Response {
    if let Some(status) = state.status {
        return (status, "forbidden by policy").into_response();
    }
    Json(state.card).into_response()
}

async fn peer_rpc(
    State(state): State<PeerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.calls.lock().push(RecordedCall {
        authorization,
        body: body.clone(),
    });
    if let Some(status) = state.status {
        return (status, "forbidden by policy").into_response();
    }

    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(Value::as_str).unwrap_or("");
    let result = match method {
        "message/send" => {
            let part = body["params"]["message"]["parts"][0].clone();
            json!({
                "kind": "task",
                "id": "task-1",
                "contextId": "ctx-1",
                "status": {"state": "completed"},
                "artifacts": [{"artifactId": "a-1", "parts": [part]}]
            })
        }
        "tasks/get" | "tasks/cancel" => {
            let state = if method == "tasks/cancel" { "canceled" } else { "completed" };
            json!({
                "kind": "task",
                "id": body["params"]["id"].clone(),
                "contextId": "ctx-1",
                "status": {"state": state}
            })
        }
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {}", other)}
            }))
            .into_response()
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}
