//! Gateway client
//!
//! Async access to the gateway's HTTP surface for hosts that can do network
//! IO, plus `ArtifactResolver`, which puts the gateway behind the device-local
//! `ArtifactStore` as its remote tier.

use exso_core::{payload, Artifact, ArtifactStore, DenialNotice, LocalStore, PaymentSlots, ShareTokenRecord};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::routes::{IssuedShareToken, PAYMENT_NONCE_HEADER};
use crate::types::{GatewayError, Result};

/// Verification poll cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Give up on verification after this long
pub const POLL_TIMEOUT: Duration = Duration::from_secs(12);

/// Result of looking an artifact up
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactLookup {
    Found(Artifact),
    NotFound,
    Denied(DenialNotice),
    /// No access signal; show the paywall
    Paywall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Redirect { url: String, session_id: Option<String> },
    /// Provider credentials missing on the gateway (preview mode)
    NotConfigured,
}

/// Outcome of the post-checkout verification step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentConfirmation {
    Verified,
    Unverified { redirect: String },
}

#[derive(Deserialize)]
struct DenialBody {
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct VerifyBody {
    #[serde(default)]
    verified: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody {
    #[serde(default)]
    provider_not_configured: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// Client for one gateway
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    /// Redirects are not followed so the paywall redirect stays visible
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("exso-gateway-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) if !body.error.is_empty() => body.error,
            _ => format!("HTTP {}", status),
        }
    }

    /// GET /artifact/{id} with whichever access signal the viewer holds
    pub async fn fetch_artifact(
        &self,
        exso_id: &str,
        token: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<ArtifactLookup> {
        let mut request = self
            .http
            .get(self.url(&format!("/artifact/{}", urlencoding::encode(exso_id))));
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            request = request.query(&[("k", token)]);
        }
        if let Some(nonce) = nonce {
            request = request.header(PAYMENT_NONCE_HEADER, nonce);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(ArtifactLookup::Found(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(ArtifactLookup::NotFound),
            StatusCode::FORBIDDEN => {
                let body: DenialBody = response.json().await?;
                let notice = match body.reason.as_str() {
                    "exhausted" => DenialNotice::Exhausted,
                    _ => DenialNotice::Invalid,
                };
                Ok(ArtifactLookup::Denied(notice))
            }
            status if status.is_redirection() => Ok(ArtifactLookup::Paywall),
            status => Err(GatewayError::Http(format!(
                "artifact fetch failed: HTTP {}",
                status
            ))),
        }
    }

    /// POST /artifact
    pub async fn publish_artifact(&self, artifact: &Artifact) -> Result<()> {
        let response = self.http.post(self.url("/artifact")).json(artifact).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(GatewayError::InvariantViolation(
                Self::error_message(response).await,
            )),
            StatusCode::BAD_REQUEST => Err(GatewayError::BadRequest(Self::error_message(response).await)),
            _ => Err(GatewayError::Http(Self::error_message(response).await)),
        }
    }

    /// POST /artifact/{id}/share
    pub async fn issue_share_token(&self, exso_id: &str) -> Result<IssuedShareToken> {
        let path = format!("/artifact/{}/share", urlencoding::encode(exso_id));
        let response = self.http.post(self.url(&path)).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(exso_id.to_string())),
            StatusCode::CONFLICT => Err(GatewayError::InvariantViolation(
                Self::error_message(response).await,
            )),
            _ => Err(GatewayError::Http(Self::error_message(response).await)),
        }
    }

    /// GET /share/{token}
    pub async fn peek_share_token(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        let path = format!("/share/{}", urlencoding::encode(token));
        let response = self.http.get(self.url(&path)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(GatewayError::Http(Self::error_message(response).await)),
        }
    }

    /// POST /checkout
    pub async fn create_checkout(&self, nonce: &str) -> Result<CheckoutOutcome> {
        let response = self
            .http
            .post(self.url("/checkout"))
            .json(&serde_json::json!({ "paymentNonce": nonce }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = Self::error_message(response).await;
            return Err(if status.is_server_error() {
                GatewayError::ProviderUnavailable(message)
            } else {
                GatewayError::BadRequest(message)
            });
        }

        let body: CheckoutBody = response.json().await?;
        if body.provider_not_configured {
            return Ok(CheckoutOutcome::NotConfigured);
        }
        let url = body
            .url
            .ok_or_else(|| GatewayError::ProviderUnavailable("checkout returned no url".into()))?;
        Ok(CheckoutOutcome::Redirect {
            url,
            session_id: body.session_id,
        })
    }

    /// GET /payment/verify
    pub async fn verify_payment(&self, nonce: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.url("/payment/verify"))
            .query(&[("nonce", nonce)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: VerifyBody = response.json().await?;
        Ok(body.verified)
    }

    /// Poll verification until it succeeds or `timeout` passes
    ///
    /// Request failures count as "not yet".
    pub async fn poll_payment(&self, nonce: &str, interval: Duration, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.verify_payment(nonce).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("Payment verification request failed: {}", e),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Verify the stored nonce after returning from checkout
    ///
    /// Success sets the verified flag. The nonce is cleared either way.
    pub async fn confirm_payment<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        slots: &PaymentSlots,
        now_ms: u64,
    ) -> PaymentConfirmation {
        let unverified = || PaymentConfirmation::Unverified {
            redirect: format!("{}?payment=unverified", exso_core::PAYWALL_PATH),
        };

        let Some(nonce) = slots.read_nonce(store, now_ms) else {
            info!("No live payment nonce to verify");
            return unverified();
        };

        let verified = self.poll_payment(&nonce, POLL_INTERVAL, POLL_TIMEOUT).await;
        slots.clear_nonce(store);
        if !verified {
            warn!("Payment not verified before timeout");
            return unverified();
        }

        if let Err(e) = slots.set_verified(store) {
            warn!("Failed to store verified flag: {}", e);
            return unverified();
        }
        slots.clear_checkout_session(store);
        PaymentConfirmation::Verified
    }
}

/// Artifact lookup across every tier: memory, local mirror, embedded
/// payload, then the gateway
pub struct ArtifactResolver<S: LocalStore> {
    store: ArtifactStore<S>,
    remote: Option<GatewayClient>,
}

impl<S: LocalStore> ArtifactResolver<S> {
    pub fn new(store: ArtifactStore<S>, remote: Option<GatewayClient>) -> Self {
        Self { store, remote }
    }

    pub fn store(&self) -> &ArtifactStore<S> {
        &self.store
    }

    fn remember(&self, artifact: &Artifact) {
        if let Err(e) = self.store.save(artifact) {
            warn!(exso_id = %artifact.id, "Not caching resolved artifact: {}", e);
        }
    }

    /// An offline gateway surfaces as `GatewayError::Unreachable`, which
    /// callers can retry; other errors are not worth retrying
    pub async fn resolve(
        &self,
        exso_id: &str,
        embedded: Option<&str>,
        token: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<ArtifactLookup> {
        if let Some(found) = self.store.get(exso_id) {
            return Ok(ArtifactLookup::Found(found));
        }

        if let Some(raw) = embedded {
            match payload::decode(raw) {
                Ok(artifact) if artifact.id == exso_id => {
                    debug!(exso_id, "Artifact decoded from link payload");
                    self.remember(&artifact);
                    return Ok(ArtifactLookup::Found(artifact));
                }
                Ok(artifact) => {
                    warn!(exso_id, payload_id = %artifact.id, "Link payload is for another artifact");
                }
                Err(e) => warn!(exso_id, "Ignoring malformed link payload: {}", e),
            }
        }

        let Some(remote) = self.remote.as_ref() else {
            return Ok(ArtifactLookup::NotFound);
        };
        let lookup = remote.fetch_artifact(exso_id, token, nonce).await?;
        if let ArtifactLookup::Found(artifact) = &lookup {
            self.remember(artifact);
        }
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::artifacts::tests::artifact;
    use exso_core::MemoryStore;

    #[tokio::test]
    async fn test_memory_tier_wins() {
        let store = ArtifactStore::new(MemoryStore::new());
        store.save(&artifact("a", None)).unwrap();
        let resolver = ArtifactResolver::new(store, None);

        let lookup = resolver.resolve("a", None, None, None).await.unwrap();
        assert_eq!(lookup, ArtifactLookup::Found(artifact("a", None)));
    }

    #[tokio::test]
    async fn test_embedded_payload_is_decoded_and_cached() {
        let resolver = ArtifactResolver::new(ArtifactStore::new(MemoryStore::new()), None);
        let encoded = payload::encode(&artifact("a", None)).unwrap();

        let lookup = resolver.resolve("a", Some(&encoded), None, None).await.unwrap();
        assert!(matches!(lookup, ArtifactLookup::Found(ref a) if a.id == "a"));
        assert!(resolver.store().get("a").is_some());
    }

    #[tokio::test]
    async fn test_malformed_payload_falls_through() {
        let resolver = ArtifactResolver::new(ArtifactStore::new(MemoryStore::new()), None);
        let lookup = resolver.resolve("a", Some("%%%not-base64"), None, None).await.unwrap();
        assert_eq!(lookup, ArtifactLookup::NotFound);
    }

    #[tokio::test]
    async fn test_payload_for_other_id_is_ignored() {
        let resolver = ArtifactResolver::new(ArtifactStore::new(MemoryStore::new()), None);
        let encoded = payload::encode(&artifact("b", None)).unwrap();
        let lookup = resolver.resolve("a", Some(&encoded), None, None).await.unwrap();
        assert_eq!(lookup, ArtifactLookup::NotFound);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_error() {
        let client = GatewayClient::new("http://127.0.0.1:1/", Duration::from_millis(500)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:1");
        let resolver = ArtifactResolver::new(ArtifactStore::new(MemoryStore::new()), Some(client));
        let err = resolver.resolve("a", None, None, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unreachable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_poll_gives_up_when_unreachable() {
        let client = GatewayClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let verified = client
            .poll_payment("nonce", Duration::from_millis(20), Duration::from_millis(100))
            .await;
        assert!(!verified);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
