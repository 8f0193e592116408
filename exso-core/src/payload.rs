//! Artifacts embedded in links (`?d=`)
//!
//! Encoded as URL-safe base64 of the artifact JSON without padding. Decoding
//! also accepts standard-alphabet and padded input from older links.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::{CoreError, Result};
use crate::types::Artifact;

/// Query parameter carrying the payload
pub const PAYLOAD_PARAM: &str = "d";

pub fn encode(artifact: &Artifact) -> Result<String> {
    let json = serde_json::to_vec(artifact)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a payload; any failure is `Malformed`
pub fn decode(payload: &str) -> Result<Artifact> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Malformed("empty payload".into()));
    }

    let bytes = [URL_SAFE_NO_PAD, URL_SAFE, STANDARD_NO_PAD, STANDARD]
        .iter()
        .find_map(|engine| engine.decode(trimmed).ok())
        .ok_or_else(|| CoreError::Malformed("payload is not base64".into()))?;

    let artifact: Artifact = serde_json::from_slice(&bytes)?;
    if artifact.id.is_empty() {
        return Err(CoreError::Malformed("payload has no id".into()));
    }
    Ok(artifact)
}
