//! Payment verification ledger
//!
//! A checkout registers the viewer's nonce; the provider webhook marks it
//! verified; the verification poll reads it back. A nonce is only good for
//! its TTL, counted from registration.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;
use exso_core::current_time_ms;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::schemas::{to_millis, Metadata, PaymentNonceDoc, PAYMENT_NONCE_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

/// Provider details recorded with a verified payment
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
}

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Record a nonce at checkout; re-registering keeps the original entry
    async fn register_nonce(&self, nonce: &str) -> Result<()>;

    /// Mark a nonce paid, creating it if this instance never saw the checkout
    async fn mark_verified(&self, nonce: &str, receipt: PaymentReceipt) -> Result<()>;

    async fn is_verified(&self, nonce: &str) -> Result<bool>;

    /// Drop expired nonces, returning how many went
    async fn purge_expired(&self) -> Result<usize>;
}

#[derive(Clone, Debug)]
struct NonceEntry {
    registered_at_ms: u64,
    verified_at_ms: Option<u64>,
    receipt: PaymentReceipt,
}

/// Process-local ledger
pub struct MemoryPaymentLedger {
    entries: DashMap<String, NonceEntry>,
    ttl_ms: u64,
}

impl MemoryPaymentLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(&self, entry: &NonceEntry, now_ms: u64) -> bool {
        now_ms.saturating_sub(entry.registered_at_ms) > self.ttl_ms
    }

    pub(crate) fn register_at(&self, nonce: &str, now_ms: u64) {
        self.entries
            .entry(nonce.to_string())
            .or_insert_with(|| NonceEntry {
                registered_at_ms: now_ms,
                verified_at_ms: None,
                receipt: PaymentReceipt::default(),
            });
    }

    pub(crate) fn mark_verified_at(&self, nonce: &str, receipt: PaymentReceipt, now_ms: u64) {
        let mut entry = self
            .entries
            .entry(nonce.to_string())
            .or_insert_with(|| NonceEntry {
                registered_at_ms: now_ms,
                verified_at_ms: None,
                receipt: PaymentReceipt::default(),
            });
        entry.verified_at_ms = Some(now_ms);
        entry.receipt = receipt;
    }

    pub(crate) fn is_verified_at(&self, nonce: &str, now_ms: u64) -> bool {
        self.entries
            .get(nonce)
            .map(|entry| entry.verified_at_ms.is_some() && !self.expired(entry.value(), now_ms))
            .unwrap_or(false)
    }

    /// Provider details of a verified nonce
    pub fn receipt(&self, nonce: &str) -> Option<PaymentReceipt> {
        let entry = self.entries.get(nonce)?;
        entry.verified_at_ms.map(|_| entry.receipt.clone())
    }

    pub(crate) fn purge_expired_at(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.expired(entry, now_ms));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl PaymentLedger for MemoryPaymentLedger {
    async fn register_nonce(&self, nonce: &str) -> Result<()> {
        self.register_at(nonce, current_time_ms());
        Ok(())
    }

    async fn mark_verified(&self, nonce: &str, receipt: PaymentReceipt) -> Result<()> {
        self.mark_verified_at(nonce, receipt, current_time_ms());
        Ok(())
    }

    async fn is_verified(&self, nonce: &str) -> Result<bool> {
        Ok(self.is_verified_at(nonce, current_time_ms()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.purge_expired_at(current_time_ms()))
    }
}

/// MongoDB-backed ledger; a TTL index on `expires_at` does the reaping
pub struct MongoPaymentLedger {
    collection: MongoCollection<PaymentNonceDoc>,
    ttl: Duration,
}

impl MongoPaymentLedger {
    pub async fn new(mongo: &MongoClient, ttl: Duration) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(PAYMENT_NONCE_COLLECTION).await?,
            ttl,
        })
    }

    fn expires_at(&self, from_ms: u64) -> bson::DateTime {
        bson::DateTime::from_millis(to_millis(from_ms).saturating_add(self.ttl.as_millis() as i64))
    }

    fn fresh_doc(&self, nonce: &str, now_ms: u64) -> PaymentNonceDoc {
        PaymentNonceDoc {
            _id: None,
            metadata: Metadata::new(),
            nonce: nonce.to_string(),
            registered_at_ms: to_millis(now_ms),
            expires_at: self.expires_at(now_ms),
            verified_at_ms: None,
            event_name: None,
            order_id: None,
            checkout_id: None,
        }
    }
}

#[async_trait]
impl PaymentLedger for MongoPaymentLedger {
    async fn register_nonce(&self, nonce: &str) -> Result<()> {
        if self
            .collection
            .try_insert_one(self.fresh_doc(nonce, current_time_ms()))
            .await?
            .is_none()
        {
            debug!("Payment nonce already registered");
        }
        Ok(())
    }

    async fn mark_verified(&self, nonce: &str, receipt: PaymentReceipt) -> Result<()> {
        let now = current_time_ms();
        // Webhook may beat (or never see) the registering instance
        self.collection
            .try_insert_one(self.fresh_doc(nonce, now))
            .await?;

        let mut set = doc! {
            "verified_at_ms": to_millis(now),
            "event_name": receipt.event_name,
            "order_id": receipt.order_id,
            "checkout_id": receipt.checkout_id,
        };
        set.extend(Metadata::touched());
        self.collection
            .update_one(doc! { "nonce": nonce }, doc! { "$set": set })
            .await?;
        Ok(())
    }

    async fn is_verified(&self, nonce: &str) -> Result<bool> {
        let Some(found) = self.collection.find_one(doc! { "nonce": nonce }).await? else {
            return Ok(false);
        };
        let live = found.expires_at.timestamp_millis() >= to_millis(current_time_ms());
        Ok(found.verified_at_ms.is_some() && live)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let removed = self
            .collection
            .delete_many(doc! { "expires_at": { "$lt": bson::DateTime::now() } })
            .await?;
        Ok(removed as usize)
    }
}

/// Periodically purge expired nonces
pub fn spawn_cleanup_task(
    ledger: Arc<dyn PaymentLedger>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    info!("Payment nonce cleanup task started");
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match ledger.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("Payment cleanup: removed {} expired nonces", removed),
                Err(e) => warn!("Payment cleanup failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(900);

    fn receipt() -> PaymentReceipt {
        PaymentReceipt {
            event_name: Some("order_created".into()),
            order_id: Some("1".into()),
            checkout_id: None,
        }
    }

    #[test]
    fn test_registered_is_not_verified_until_webhook() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.register_at("n1", 0);
        assert!(!ledger.is_verified_at("n1", 1_000));

        assert_eq!(ledger.receipt("n1"), None);
        ledger.mark_verified_at("n1", receipt(), 2_000);
        assert!(ledger.is_verified_at("n1", 3_000));
        assert_eq!(ledger.receipt("n1"), Some(receipt()));
        assert!(!ledger.is_verified_at("n2", 3_000));
    }

    #[test]
    fn test_verification_expires_with_nonce() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.register_at("n1", 0);
        ledger.mark_verified_at("n1", receipt(), 1_000);

        let ttl_ms = TTL.as_millis() as u64;
        assert!(ledger.is_verified_at("n1", ttl_ms));
        assert!(!ledger.is_verified_at("n1", ttl_ms + 1));
    }

    #[test]
    fn test_reregistering_keeps_original_time() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.register_at("n1", 0);
        ledger.register_at("n1", 500_000);
        ledger.mark_verified_at("n1", receipt(), 600_000);

        let ttl_ms = TTL.as_millis() as u64;
        assert!(!ledger.is_verified_at("n1", ttl_ms + 1));
    }

    #[test]
    fn test_webhook_before_registration() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.mark_verified_at("late", receipt(), 10);
        assert!(ledger.is_verified_at("late", 20));
    }

    #[test]
    fn test_purge_expired() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.register_at("old", 0);
        ledger.register_at("new", 800_000);

        assert_eq!(ledger.purge_expired_at(950_000), 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.entries.contains_key("new"));
    }

    #[tokio::test]
    async fn test_trait_uses_wall_clock() {
        let ledger = MemoryPaymentLedger::new(TTL);
        ledger.register_nonce("n").await.unwrap();
        assert!(!ledger.is_verified("n").await.unwrap());
        ledger.mark_verified("n", receipt()).await.unwrap();
        assert!(ledger.is_verified("n").await.unwrap());
        assert_eq!(ledger.purge_expired().await.unwrap(), 0);
    }
}
