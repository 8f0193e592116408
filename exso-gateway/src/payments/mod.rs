//! Payment provider integration
//!
//! - `checkout`: hosted checkout session creation
//! - `signature`: HMAC verification of webhook bodies
//! - `webhook`: paid-event detection and reference extraction

pub mod checkout;
pub mod signature;
pub mod webhook;

pub use checkout::{CheckoutClient, CheckoutSession};
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
pub use webhook::{extract_reference, is_paid_event};

/// Longest nonce accepted from a client
pub const MAX_NONCE_LEN: usize = 128;

/// Nonces are opaque tokens of URL-safe characters
pub fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty()
        && nonce.len() <= MAX_NONCE_LEN
        && nonce
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
