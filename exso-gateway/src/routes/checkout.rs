//! POST /checkout: start a hosted checkout for a payment nonce

use hyper::body::Incoming;
use hyper::{header, HeaderMap, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::payments::is_valid_nonce;
use crate::server::response::{error_response, json_response, parse_json_body, BoxBody};
use crate::server::AppState;
use crate::types::{GatewayError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    payment_nonce: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Origin for return URLs: configured, else the caller's Origin, else its Host
fn request_origin(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = state.args.public_origin.as_deref() {
        return Some(origin.to_string());
    }
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| *o != "null")
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|host| format!("http://{}", host))
        })
}

pub async fn handle_checkout(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    match checkout(&state, req).await {
        Ok(response) => response,
        // Preview mode: the viewer page simulates the purchase
        Err(GatewayError::ProviderNotConfigured) => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "providerNotConfigured": true,
                "preview": true,
                "reason": "not_configured",
            }),
        ),
        Err(e) => error_response(e),
    }
}

async fn checkout(state: &AppState, req: Request<Incoming>) -> Result<Response<BoxBody>> {
    let origin = request_origin(state, req.headers());
    let body: CheckoutRequest = parse_json_body(req, state.args.max_body_bytes).await?;
    let nonce = body.payment_nonce.trim();
    if !is_valid_nonce(nonce) {
        return Err(GatewayError::BadRequest("Invalid payment nonce".into()));
    }

    let client = state
        .checkout
        .as_ref()
        .ok_or(GatewayError::ProviderNotConfigured)?;
    let origin = origin.ok_or_else(|| GatewayError::BadRequest("Cannot determine origin".into()))?;

    state.payments.register_nonce(nonce).await?;
    let session = client.create_session(nonce, &origin).await?;
    info!(session_id = ?session.id, "Checkout session created");

    Ok(json_response(
        StatusCode::OK,
        &CheckoutResponse {
            url: session.url,
            session_id: session.id,
        },
    ))
}
