//! Payment verification and the provider webhook
//!
//! The webhook marks a nonce verified once a signed paid event names it;
//! `/payment/verify` lets the viewer poll for that.

use hyper::body::Incoming;
use hyper::{header, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::payments::{
    extract_reference, is_paid_event, is_valid_nonce, verify_signature, webhook, SIGNATURE_HEADER,
};
use crate::server::response::{
    error_response, json_response, json_response_with, parse_query, read_body, BoxBody,
};
use crate::server::AppState;
use crate::types::GatewayError;

#[derive(Debug, Default, Deserialize)]
struct VerifyQuery {
    nonce: Option<String>,
}

/// GET /payment/verify?nonce=
///
/// Always 200; anything short of a verified nonce reads `verified: false`.
pub async fn handle_verify(state: Arc<AppState>, query: Option<&str>) -> Response<BoxBody> {
    let query: VerifyQuery = parse_query(query);
    let verified = match query.nonce.as_deref().map(str::trim) {
        Some(nonce) if is_valid_nonce(nonce) => match state.payments.is_verified(nonce).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!("Payment lookup failed: {}", e);
                false
            }
        },
        _ => false,
    };
    json_response_with(
        StatusCode::OK,
        &serde_json::json!({ "verified": verified }),
        &[(header::CACHE_CONTROL.as_str(), "no-store".to_string())],
    )
}

/// POST /webhook/payment
pub async fn handle_webhook(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    let Some(secret) = state.args.payment_webhook_secret.clone() else {
        warn!("Payment webhook called but no secret is configured");
        return error_response(GatewayError::Config("webhook secret not set".into()));
    };

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let Some(signature) = signature else {
        return error_response(GatewayError::Unauthorized("missing signature".into()));
    };

    let body = match read_body(req, state.args.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => return error_response(e),
    };
    if !verify_signature(&secret, &body, signature.trim()) {
        warn!("Payment webhook with invalid signature");
        return error_response(GatewayError::Unauthorized("invalid signature".into()));
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(_) => return error_response(GatewayError::Malformed("invalid webhook payload".into())),
    };

    if !is_paid_event(&event) {
        debug!(event = ?webhook::event_name(&event), "Ignoring unpaid webhook event");
        return json_response(StatusCode::OK, &serde_json::json!({ "ok": true, "ignored": true }));
    }

    let Some(nonce) = extract_reference(&event) else {
        warn!("Paid webhook event without a payment reference");
        return json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": true, "ignored": true, "reason": "missing_reference" }),
        );
    };
    if !is_valid_nonce(&nonce) {
        warn!("Paid webhook event with a malformed payment reference");
        return json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": true, "ignored": true, "reason": "invalid_reference" }),
        );
    }

    match state.payments.mark_verified(&nonce, webhook::receipt(&event)).await {
        Ok(()) => {
            info!("Payment verified");
            json_response(StatusCode::OK, &serde_json::json!({ "ok": true }))
        }
        Err(e) => error_response(e),
    }
}
