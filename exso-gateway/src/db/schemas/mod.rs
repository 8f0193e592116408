//! Database schemas
//!
//! Document structures for artifacts, share tokens and payment nonces.

mod artifact;
mod metadata;
mod payment_nonce;
mod share_token;

pub use artifact::{ArtifactDoc, ARTIFACT_COLLECTION};
pub use metadata::Metadata;
pub use payment_nonce::{PaymentNonceDoc, PAYMENT_NONCE_COLLECTION};
pub use share_token::{ShareTokenDoc, SHARE_TOKEN_COLLECTION};
pub(crate) use share_token::to_millis;
