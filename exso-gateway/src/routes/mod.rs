//! HTTP route handlers
//!
//! - `artifact`: gated fetch and publish
//! - `share`: share token issue and peek
//! - `shortlink`: `/x/{id}` redirects
//! - `checkout` / `payment`: paid access
//! - `health`: liveness and build info

pub mod artifact;
pub mod checkout;
pub mod health;
pub mod payment;
pub mod share;
pub mod shortlink;

pub use artifact::{handle_get_artifact, handle_publish_artifact, PAYMENT_NONCE_HEADER, USES_REMAINING_HEADER};
pub use checkout::{handle_checkout, CheckoutResponse};
pub use health::{health_check, version_info, HealthResponse};
pub use payment::{handle_verify, handle_webhook};
pub use share::{handle_issue_share, handle_peek_share, IssuedShareToken};
pub use shortlink::{handle_short_link, playback_path, short_link};
