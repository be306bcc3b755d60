//! Demo MCP server exposing `get_current_time` over streamable HTTP.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `RUST_LOG` — Tracing filter (default: "info,a2a_bridge=debug")

use std::process::ExitCode;

use anyhow::Context as _;

use a2a_bridge::mcp::time_server;

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
            tracing::error!("time MCP server failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let server = time_server();
    let app = server.router();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("MCP server starting on {}", bind_addr);
    tracing::info!("  POST /mcp — streamable HTTP transport");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
