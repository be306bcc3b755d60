//! HTTP server for the orchestrator.
//!
//! Exposes the composed capabilities so a front end (or a test harness)
//! can list and invoke them without embedding the library.
//!
//! # Endpoints
//!
//! - `GET  /health`       — Liveness probe
//! - `GET  /capabilities` — Registered capability declarations
//! - `POST /invoke`       — `{name, arguments}` → `{result}`
//! - `POST /turn`         — `{input}` → `{response, steps}`

pub mod routes;

pub use routes::{app_router, AppState};
