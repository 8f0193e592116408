//! Share token endpoints

use exso_core::token_fingerprint;
use hyper::{header, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::routes::shortlink::short_link;
use crate::server::response::{error_response, json_response, json_response_with, BoxBody};
use crate::server::AppState;
use crate::types::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedShareToken {
    pub token: String,
    pub exso_id: String,
    pub uses_remaining: u32,
    /// Relative short link for the recipient
    pub url: String,
}

/// POST /artifact/{id}/share
pub async fn handle_issue_share(state: Arc<AppState>, exso_id: &str) -> Response<BoxBody> {
    match state.artifacts.get(exso_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(GatewayError::NotFound(exso_id.to_string())),
        Err(e) => return error_response(e),
    }

    match state.tokens.issue(exso_id).await {
        Ok(token) => {
            let issued = IssuedShareToken {
                url: short_link(exso_id, Some(&token)),
                uses_remaining: state.tokens.quota(),
                exso_id: exso_id.to_string(),
                token,
            };
            json_response(StatusCode::CREATED, &issued)
        }
        Err(e) => error_response(e),
    }
}

/// GET /share/{token}: live remaining-uses counter
pub async fn handle_peek_share(state: Arc<AppState>, token: &str) -> Response<BoxBody> {
    match state.tokens.peek(token).await {
        Ok(Some(record)) => json_response_with(
            StatusCode::OK,
            &record,
            &[(header::CACHE_CONTROL.as_str(), "no-store".to_string())],
        ),
        Ok(None) => {
            debug!(token = %token_fingerprint(token), "Peek of unknown share token");
            error_response(GatewayError::NotFound("share token".into()))
        }
        Err(e) => error_response(e),
    }
}
