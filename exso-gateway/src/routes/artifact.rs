//! Artifact endpoints
//!
//! `GET /artifact/{id}` runs the access gate before touching storage: a
//! share token (`?k=`) is consumed, otherwise the viewer's payment nonce
//! (`X-Payment-Nonce` header or `?nonce=`) must be verified. Viewers with
//! neither are redirected to the paywall.

use exso_core::{AccessDecision, Artifact, GateCheck, GrantedVia, PageGate};
use hyper::body::Incoming;
use hyper::{header, HeaderMap, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::payments::is_valid_nonce;
use crate::server::response::{
    error_response, json_response, json_response_with, parse_json_body, parse_query,
    redirect_response, BoxBody,
};
use crate::server::AppState;
use crate::types::{GatewayError, Result};

/// Header carrying the viewer's payment nonce
pub const PAYMENT_NONCE_HEADER: &str = "x-payment-nonce";
/// Response header set when access came from a share token
pub const USES_REMAINING_HEADER: &str = "x-share-uses-remaining";

#[derive(Debug, Default, Deserialize)]
struct ArtifactQuery {
    /// Share token
    k: Option<String>,
    nonce: Option<String>,
}

fn payment_nonce(headers: &HeaderMap, query: &ArtifactQuery) -> Option<String> {
    headers
        .get(PAYMENT_NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.nonce.clone())
        .map(|n| n.trim().to_string())
        .filter(|n| is_valid_nonce(n))
}

/// Run the gate for one request
async fn decide(state: &AppState, exso_id: &str, query: &ArtifactQuery, headers: &HeaderMap) -> Result<AccessDecision> {
    let mut gate = PageGate::new(exso_id, query.k.as_deref());
    let decision = match gate.plan() {
        Some(GateCheck::ConsumeToken { token }) => {
            let outcome = state.tokens.consume(&token, exso_id).await?;
            gate.settle_token(outcome)
        }
        Some(GateCheck::CheckPayment) => {
            let verified = match payment_nonce(headers, query) {
                Some(nonce) => state.payments.is_verified(&nonce).await?,
                None => false,
            };
            gate.settle_payment(verified)
        }
        None => gate.decision().unwrap_or(AccessDecision::RedirectToPaywall),
    };
    Ok(decision)
}

/// GET /artifact/{id}
pub async fn handle_get_artifact(
    state: Arc<AppState>,
    exso_id: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Response<BoxBody> {
    let query: ArtifactQuery = parse_query(query);

    let decision = match decide(&state, exso_id, &query, headers).await {
        Ok(decision) => decision,
        Err(e) => return error_response(e),
    };

    let via = match decision {
        AccessDecision::Granted(via) => via,
        AccessDecision::Denied(notice) => {
            debug!(exso_id, reason = ?notice, "Artifact access denied");
            return error_response(GatewayError::AccessDenied(notice));
        }
        AccessDecision::RedirectToPaywall => {
            debug!(exso_id, "No access signal, redirecting to paywall");
            return redirect_response(StatusCode::SEE_OTHER, &state.args.paywall_path);
        }
    };

    let artifact = match state.artifacts.get(exso_id).await {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return error_response(GatewayError::NotFound(exso_id.to_string())),
        Err(e) => return error_response(e),
    };

    let mut headers = vec![(header::CACHE_CONTROL.as_str(), "no-store".to_string())];
    if let GrantedVia::ShareToken { uses_remaining } = via {
        headers.push((USES_REMAINING_HEADER, uses_remaining.to_string()));
    }
    json_response_with(StatusCode::OK, &artifact, &headers)
}

/// POST /artifact
pub async fn handle_publish_artifact(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    match publish(&state, req).await {
        Ok(exso_id) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": true, "id": exso_id }),
        ),
        Err(e) => error_response(e),
    }
}

async fn publish(state: &AppState, req: Request<Incoming>) -> Result<String> {
    let body: serde_json::Value = parse_json_body(req, state.args.max_body_bytes).await?;

    let has_id = body
        .get("id")
        .and_then(|id| id.as_str())
        .map(|id| !id.trim().is_empty())
        .unwrap_or(false);
    if !has_id {
        return Err(GatewayError::BadRequest("Missing id".into()));
    }

    let artifact: Artifact = serde_json::from_value(body)?;
    state.artifacts.save(&artifact).await?;
    info!(exso_id = %artifact.id, "Artifact published");
    Ok(artifact.id)
}
