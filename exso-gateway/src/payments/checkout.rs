//! Checkout sessions with the payment provider
//!
//! Form-encoded POST in the Stripe Checkout shape. The viewer's payment
//! nonce rides along as `client_reference_id` and in metadata so the
//! webhook can hand it back.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{GatewayError, Result};

/// Path viewers return to after paying
pub const SUCCESS_PATH: &str = "/loading";
/// Path viewers return to after cancelling
pub const CANCEL_PATH: &str = "/create/weight";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

/// Payment provider client
#[derive(Clone)]
pub struct CheckoutClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
    price_id: String,
}

impl CheckoutClient {
    pub fn new(api_url: &str, secret_key: &str, price_id: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            secret_key: secret_key.to_string(),
            price_id: price_id.to_string(),
        })
    }

    fn form(&self, nonce: &str, origin: &str) -> Vec<(&'static str, String)> {
        let origin = origin.trim_end_matches('/');
        vec![
            ("mode", "payment".to_string()),
            ("success_url", format!("{}{}", origin, SUCCESS_PATH)),
            ("cancel_url", format!("{}{}", origin, CANCEL_PATH)),
            ("line_items[0][price]", self.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("client_reference_id", nonce.to_string()),
            ("metadata[payment_nonce]", nonce.to_string()),
        ]
    }

    /// Open a hosted checkout for `nonce`
    ///
    /// Transport failures and non-2xx answers are `ProviderUnavailable`.
    pub async fn create_session(&self, nonce: &str, origin: &str) -> Result<CheckoutSession> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.secret_key)
            .form(&self.form(nonce, origin))
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Checkout session rejected by provider");
            return Err(GatewayError::ProviderUnavailable(format!(
                "provider returned {}",
                status
            )));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(format!("unreadable session: {}", e)))?;
        info!(session_id = ?session.id, "Checkout session created");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields() {
        let client = CheckoutClient::new(
            "https://provider.test/v1/checkout/sessions",
            "sk_test",
            "price_1",
            Duration::from_secs(1),
        )
        .unwrap();
        let form = client.form("abc123", "https://exso.test/");

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("success_url"), Some("https://exso.test/loading"));
        assert_eq!(get("cancel_url"), Some("https://exso.test/create/weight"));
        assert_eq!(get("line_items[0][price]"), Some("price_1"));
        assert_eq!(get("line_items[0][quantity]"), Some("1"));
        assert_eq!(get("client_reference_id"), Some("abc123"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let client = CheckoutClient::new(
            "http://127.0.0.1:1/v1/checkout/sessions",
            "sk_test",
            "price_1",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.create_session("abc", "http://localhost").await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable(_)));
    }
}
