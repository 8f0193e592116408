//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use exso_core::IssuePolicy;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Exso gateway - artifacts, share tokens and payment verification
#[derive(Parser, Debug, Clone)]
#[command(name = "exso-gateway")]
#[command(about = "HTTP gateway for Exso artifacts, share tokens and payments")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, webhook secret optional)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// MongoDB connection URI; in-memory stores are used when absent
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "exso")]
    pub mongodb_db: String,

    /// Public origin used for checkout return URLs (defaults to the request's Origin/Host)
    #[arg(long, env = "PUBLIC_ORIGIN")]
    pub public_origin: Option<String>,

    /// Where viewers without access are sent
    #[arg(long, env = "PAYWALL_PATH", default_value = exso_core::PAYWALL_PATH)]
    pub paywall_path: String,

    /// Checkout session endpoint of the payment provider
    #[arg(
        long,
        env = "CHECKOUT_API_URL",
        default_value = "https://api.stripe.com/v1/checkout/sessions"
    )]
    pub checkout_api_url: String,

    /// Payment provider secret key
    #[arg(long, env = "CHECKOUT_SECRET_KEY")]
    pub checkout_secret_key: Option<String>,

    /// Price the checkout session charges
    #[arg(long, env = "CHECKOUT_PRICE_ID")]
    pub checkout_price_id: Option<String>,

    /// Shared secret for payment webhook signatures (required in production)
    #[arg(long, env = "PAYMENT_WEBHOOK_SECRET")]
    pub payment_webhook_secret: Option<String>,

    /// Seconds a payment nonce stays verifiable after checkout starts
    #[arg(long, env = "PAYMENT_NONCE_TTL_SECS", default_value = "900")]
    pub payment_nonce_ttl_secs: u64,

    /// Opens allowed per share token
    #[arg(long, env = "SHARE_TOKEN_QUOTA", default_value_t = exso_core::DEFAULT_SHARE_QUOTA)]
    pub share_token_quota: u32,

    /// Create unknown share tokens on first consume instead of rejecting them
    #[arg(long, env = "LAZY_SHARE_TOKENS", default_value = "false")]
    pub lazy_share_tokens: bool,

    /// Outbound request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "262144")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.payment_webhook_secret.is_none() {
            return Err("PAYMENT_WEBHOOK_SECRET is required in production mode".to_string());
        }

        if self.share_token_quota == 0 {
            return Err("SHARE_TOKEN_QUOTA must be at least 1".to_string());
        }

        if self.payment_nonce_ttl_secs == 0 {
            return Err("PAYMENT_NONCE_TTL_SECS must be greater than 0".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than 0".to_string());
        }

        if !self.paywall_path.starts_with('/') {
            return Err("PAYWALL_PATH must be an absolute path".to_string());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err("LOG_FORMAT must be 'text' or 'json'".to_string());
        }

        Ok(())
    }

    /// Secret key and price id, when both are set
    pub fn checkout_credentials(&self) -> Option<(&str, &str)> {
        let key = self.checkout_secret_key.as_deref().filter(|k| !k.is_empty())?;
        let price = self.checkout_price_id.as_deref().filter(|p| !p.is_empty())?;
        Some((key, price))
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.payment_nonce_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn issue_policy(&self) -> IssuePolicy {
        if self.lazy_share_tokens {
            IssuePolicy::LazyOnFirstConsume
        } else {
            IssuePolicy::RequireIssued
        }
    }
}
