//! Orchestrator binary.
//!
//! Registers every configured peer agent and MCP toolset as a capability,
//! then serves the orchestrator HTTP surface.
//!
//! # Environment Variables
//!
//! - `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_LOCATION` — required
//! - `A2A_PEER_URLS` — comma-separated peer agent base addresses
//! - `MCP_HOST`, `MCP_ENDPOINT` — MCP toolset host and path (default `/mcp`)
//! - `A2A_REGISTRATION_POLICY` — `fail-fast` (default) or `skip-unreachable`
//! - `A2A_SKIP_SUMMARIZATION` — return peer results verbatim (default true)
//! - `A2A_REQUEST_TIMEOUT_SECS` — per-call timeout (default 120)
//! - `A2A_BRIDGE_CONFIG` — optional YAML file with the same settings
//! - `PORT` — HTTP port (default: 8080)
//! - `RUST_LOG` — Tracing filter (default: "info,a2a_bridge=debug")
//!
//! # Usage
//!
//! ```bash
//! A2A_PEER_URLS=https://time-agent.example.run.app cargo run --bin orchestrator
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;

use a2a_bridge::auth::{find_default_credentials, CredentialStore, DefaultCredentialsOptions};
use a2a_bridge::config::BridgeConfig;
use a2a_bridge::context::InvocationContext;
use a2a_bridge::orchestrator::{register_mcp_toolset, register_remote_agents, Orchestrator};
use a2a_bridge::server::{app_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,a2a_bridge=debug".into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("orchestrator failed to start: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        project = %config.project,
        location = %config.location,
        peers = config.peer_urls.len(),
        policy = %config.registration_policy,
        "loaded configuration"
    );

    let issuer = find_default_credentials(&DefaultCredentialsOptions::from_env())
        .await
        .context("no identity credentials available")?;
    let store = CredentialStore::new(issuer);
    let options = config.registration_options();
    let ctx = InvocationContext::new().with_timeout(config.request_timeout());

    let report = register_remote_agents(&store, &config.peer_urls, &options, &ctx)
        .await
        .context("failed to register remote agents")?;
    for skipped in &report.skipped {
        tracing::warn!(peer = %skipped.base, "peer excluded: {}", skipped.error);
    }
    let mut capabilities = report.capabilities;

    if let Some(mcp) = &config.mcp {
        let tools = register_mcp_toolset(&store, mcp, &options, &ctx)
            .await
            .with_context(|| format!("failed to register toolset {}", mcp.server_identifier()))?;
        capabilities.extend(tools);
    }

    let orchestrator = Orchestrator::new(capabilities)?;
    tracing::info!(capabilities = ?orchestrator.names(), "orchestrator ready");

    let state = AppState::new(Arc::new(orchestrator)).with_request_timeout(config.request_timeout());
    let app = app_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("orchestrator listening on {}", bind_addr);

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
