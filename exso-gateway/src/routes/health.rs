//! Health and version endpoints
//!
//! `/health` always answers 200 while the process runs; the body says which
//! backends are wired so operators can spot a gateway that fell back to
//! in-memory stores.

use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::server::response::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub mode: &'static str,
    pub node_id: String,
    /// "mongodb" or "memory"
    pub backend: &'static str,
    pub checkout_configured: bool,
    pub webhook_configured: bool,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
}

pub fn build_health_response(state: &AppState) -> HealthResponse {
    let args = &state.args;
    HealthResponse {
        healthy: true,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if args.dev_mode { "development" } else { "production" },
        node_id: args.node_id.to_string(),
        backend: state.backend,
        checkout_configured: state.checkout.is_some(),
        webhook_configured: args.payment_webhook_secret.is_some(),
    }
}

/// Liveness probe (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Build metadata captured by build.rs
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
    };
    json_response(StatusCode::OK, &response)
}
