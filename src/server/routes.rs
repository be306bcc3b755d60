//! Axum route handlers for the orchestrator HTTP surface.
//!
//! # Routes
//!
//! - `GET  /health`       — Returns `{"status": "ok", "version": ...}`
//! - `GET  /capabilities` — Declarations of every registered capability
//! - `POST /invoke`       — Invoke one capability by name
//! - `POST /turn`         — Run one reasoning turn over all capabilities

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::context::InvocationContext;
use crate::error::BridgeError;
use crate::orchestrator::Orchestrator;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Upper bound on one request, on top of client disconnects.
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// A context cancelled when `token` is dropped or the timeout passes.
    fn context(&self, token: &CancellationToken) -> InvocationContext {
        let ctx = InvocationContext::with_cancellation(token.clone());
        match self.request_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/capabilities", get(capabilities_handler))
        .route("/invoke", post(invoke_handler))
        .route("/turn", post(turn_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub response: String,
    pub steps: usize,
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(err: BridgeError) -> ApiError {
    let status = match &err {
        BridgeError::UnknownCapability { .. } => StatusCode::NOT_FOUND,
        BridgeError::Invocation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BridgeError::Cancelled | BridgeError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), "request failed: {}", err);
    } else {
        tracing::debug!(status = status.as_u16(), "request failed: {}", err);
    }
    (status, Json(json!({"error": err.to_string()})))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health — liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "capabilities": state.orchestrator.len(),
    }))
}

/// GET /capabilities — what the reasoning loop is shown.
async fn capabilities_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"capabilities": state.orchestrator.declarations()}))
}

/// POST /invoke — invoke one capability.
///
/// Dropping the request (client disconnect) cancels the outbound call.
async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();
    let ctx = state.context(&token);

    tracing::info!(capability = %request.name, "invoke");
    let result = state
        .orchestrator
        .invoke(&ctx, &request.name, request.arguments)
        .await
        .map_err(error_response)?;
    Ok(Json(InvokeResponse { result }))
}

/// POST /turn — let the reasoner answer `input`.
async fn turn_handler(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();
    let ctx = state.context(&token);

    let turn = state
        .orchestrator
        .run_turn(&ctx, &request.input)
        .await
        .map_err(error_response)?;
    tracing::info!(steps = turn.steps, "turn complete");
    Ok(Json(TurnResponse {
        response: turn.response,
        steps: turn.steps,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::orchestrator::{Decision, Reasoner, ToolCall, TurnMessage};
    use crate::tools::{Capability, CapabilityDeclaration, FunctionTool};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn capabilities() -> Vec<Arc<dyn Capability>> {
        vec![
            Arc::new(
                FunctionTool::new("get_current_time", "Retrieves the current time", |_ctx, args| async move {
                    match args["city"].as_str() {
                        Some("london") => Ok(json!("The current time is 10.30am")),
                        _ => Err(BridgeError::invocation("get_current_time", "city is required")),
                    }
                }),
            ),
            Arc::new(FunctionTool::new("locked", "Needs credentials", |_ctx, _args| async {
                Err(AuthError::Issuance {
                    audience: "https://locked.example.run.app".into(),
                    message: "no credentials".into(),
                }
                .into())
            })),
            Arc::new(FunctionTool::new("slow", "Sleeps", |_ctx, _args| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            })),
        ]
    }

    fn app() -> Router {
        let orchestrator = Orchestrator::new(capabilities()).unwrap();
        app_router(
            AppState::new(Arc::new(orchestrator)).with_request_timeout(Duration::from_millis(50)),
        )
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn invoke(body: Value) -> (StatusCode, Value) {
        let response = app().oneshot(post_json("/invoke", body)).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["capabilities"], 3);
    }

    #[tokio::test]
    async fn test_capabilities() {
        let request = Request::builder()
            .uri("/capabilities")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app().oneshot(request).await.unwrap()).await;
        assert_eq!(json["capabilities"][0]["name"], "get_current_time");
        assert_eq!(json["capabilities"][0]["description"], "Retrieves the current time");
        assert_eq!(json["capabilities"][0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn test_invoke() {
        let (status, json) =
            invoke(json!({"name": "get_current_time", "arguments": {"city": "london"}})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"], "The current time is 10.30am");
    }

    #[tokio::test]
    async fn test_invoke_error_statuses() {
        let (status, json) = invoke(json!({"name": "weather_agent"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("weather_agent"));

        let (status, _) = invoke(json!({"name": "get_current_time", "arguments": {}})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = invoke(json!({"name": "locked"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = invoke(json!({"name": "slow"})).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    struct AskOnce;

    #[async_trait]
    impl Reasoner for AskOnce {
        async fn decide(
            &self,
            _ctx: &InvocationContext,
            _capabilities: &[CapabilityDeclaration],
            history: &[TurnMessage],
        ) -> crate::error::Result<Decision> {
            match history.last() {
                Some(TurnMessage::ToolResults { outcomes }) => Ok(Decision::Respond(
                    outcomes[0].output.clone().unwrap_or_default().to_string(),
                )),
                _ => Ok(Decision::Invoke(vec![ToolCall::new(
                    "get_current_time",
                    json!({"city": "london"}),
                )])),
            }
        }
    }

    #[tokio::test]
    async fn test_turn() {
        let orchestrator = Orchestrator::new(capabilities())
            .unwrap()
            .with_reasoner(Arc::new(AskOnce));
        let app = app_router(AppState::new(Arc::new(orchestrator)));

        let response = app
            .oneshot(post_json("/turn", json!({"input": "time in london?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["response"], "\"The current time is 10.30am\"");
        assert_eq!(json["steps"], 2);
    }

    #[tokio::test]
    async fn test_turn_without_reasoner() {
        let response = app()
            .oneshot(post_json("/turn", json!({"input": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_dropped_request_cancels_invocation() {
        let observed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = observed.clone();
        let waiting = FunctionTool::new("wait", "Waits to be cancelled", move |ctx, _args| {
            let flag = flag.clone();
            async move {
                let token = ctx.cancellation_token().clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                });
                std::future::pending::<crate::error::Result<Value>>().await
            }
        });
        let orchestrator = Orchestrator::new(vec![Arc::new(waiting) as Arc<dyn Capability>]).unwrap();
        let app = app_router(AppState::new(Arc::new(orchestrator)));

        // The client gives up; the handler future is dropped mid-call.
        let request = app.oneshot(post_json("/invoke", json!({"name": "wait"})));
        assert!(tokio::time::timeout(Duration::from_millis(100), request)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(observed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
