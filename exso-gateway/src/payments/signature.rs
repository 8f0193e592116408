//! Webhook signature verification
//!
//! The provider sends `x-signature: hex(HMAC-SHA256(secret, raw_body))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a presented signature in constant time
///
/// Comparison is over the hex text, so case and length must match exactly.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign(secret, body);
    if expected.is_empty() || expected.len() != signature.len() {
        return false;
    }
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
