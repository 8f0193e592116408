//! Server-side share token ledger
//!
//! Issue and consume share one store here, so by default unknown tokens are
//! invalid. `LAZY_SHARE_TOKENS` restores create-on-first-consume.
//!
//! An artifact gets exactly one token. Re-issuing would hand out a fresh
//! quota, so a second issue for the same artifact is refused.

use async_trait::async_trait;
use bson::doc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use exso_core::{
    current_time_ms, token_fingerprint, ConsumeOutcome, ConsumeRejection, IssuePolicy,
    MemoryTokenTable, ShareTokenRecord, ShareTokenRegistry,
};
use tracing::{debug, info, warn};

use crate::db::schemas::{to_millis, ShareTokenDoc, SHARE_TOKEN_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{GatewayError, Result};

const MAX_ISSUE_ATTEMPTS: usize = 5;
const MAX_CONSUME_ATTEMPTS: usize = 16;

#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// New token bound to `exso_id` at full quota; `InvariantViolation` if
    /// the artifact already has one
    async fn issue(&self, exso_id: &str) -> Result<String>;

    /// Spend one open; rejections leave the record untouched
    async fn consume(&self, token: &str, exso_id: &str) -> Result<ConsumeOutcome>;

    async fn peek(&self, token: &str) -> Result<Option<ShareTokenRecord>>;

    fn quota(&self) -> u32;
}

/// Process-local ledger over the core registry
pub struct MemoryTokenLedger {
    registry: ShareTokenRegistry<MemoryTokenTable>,
    /// exso_id -> the artifact's token
    issued: DashMap<String, String>,
    policy: IssuePolicy,
}

impl MemoryTokenLedger {
    pub fn new(quota: u32, policy: IssuePolicy) -> Self {
        Self {
            registry: ShareTokenRegistry::with_policy(MemoryTokenTable::new(), quota, policy),
            issued: DashMap::new(),
            policy,
        }
    }
}

fn already_issued(exso_id: &str) -> GatewayError {
    GatewayError::InvariantViolation(format!("share token already issued for {}", exso_id))
}

#[async_trait]
impl TokenLedger for MemoryTokenLedger {
    async fn issue(&self, exso_id: &str) -> Result<String> {
        match self.issued.entry(exso_id.to_string()) {
            Entry::Occupied(_) => Err(already_issued(exso_id)),
            Entry::Vacant(slot) => {
                let token = self.registry.issue(exso_id, current_time_ms())?;
                slot.insert(token.clone());
                Ok(token)
            }
        }
    }

    async fn consume(&self, token: &str, exso_id: &str) -> Result<ConsumeOutcome> {
        if self.policy == IssuePolicy::LazyOnFirstConsume
            && !token.is_empty()
            && self.registry.peek(token)?.is_none()
        {
            // A lazily created token still has to be the artifact's only one
            match self.issued.entry(exso_id.to_string()) {
                Entry::Occupied(existing) if existing.get() != token => {
                    return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(token.to_string());
                }
            }
        }
        Ok(self.registry.consume(token, exso_id, current_time_ms())?)
    }

    async fn peek(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        Ok(self.registry.peek(token)?)
    }

    fn quota(&self) -> u32 {
        self.registry.quota()
    }
}

/// MongoDB-backed ledger
///
/// Consumption is a compare-and-swap on `uses_remaining`: the update only
/// matches if the counter still holds the value the decision was made on.
pub struct MongoTokenLedger {
    collection: MongoCollection<ShareTokenDoc>,
    quota: u32,
    policy: IssuePolicy,
}

impl MongoTokenLedger {
    pub async fn new(mongo: &MongoClient, quota: u32, policy: IssuePolicy) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(SHARE_TOKEN_COLLECTION).await?,
            quota,
            policy,
        })
    }

    async fn load(&self, token: &str) -> Result<Option<ShareTokenDoc>> {
        self.collection.find_one(doc! { "token": token }).await
    }

    async fn has_token_for(&self, exso_id: &str) -> Result<bool> {
        Ok(self
            .collection
            .find_one(doc! { "exso_id": exso_id })
            .await?
            .is_some())
    }
}

#[async_trait]
impl TokenLedger for MongoTokenLedger {
    async fn issue(&self, exso_id: &str) -> Result<String> {
        if self.has_token_for(exso_id).await? {
            return Err(already_issued(exso_id));
        }

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = uuid::Uuid::new_v4().simple().to_string();
            let record = ShareTokenRecord::new(exso_id, self.quota, current_time_ms());
            if self
                .collection
                .try_insert_one(ShareTokenDoc::new(&token, &record))
                .await?
                .is_some()
            {
                info!(exso_id, token = %token_fingerprint(&token), "Issued share token");
                return Ok(token);
            }
            // Duplicate key: either a token collision or a concurrent issue won
            if self.has_token_for(exso_id).await? {
                return Err(already_issued(exso_id));
            }
        }
        Err(GatewayError::Busy("share token issue".into()))
    }

    async fn consume(&self, token: &str, exso_id: &str) -> Result<ConsumeOutcome> {
        if token.is_empty() {
            return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
        }

        for attempt in 0..MAX_CONSUME_ATTEMPTS {
            let now = current_time_ms();
            let current = match self.load(token).await? {
                Some(found) => found,
                None => match self.policy {
                    IssuePolicy::RequireIssued => {
                        return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
                    }
                    IssuePolicy::LazyOnFirstConsume => {
                        let fresh = ShareTokenRecord::new(exso_id, self.quota, now);
                        let inserted = self
                            .collection
                            .try_insert_one(ShareTokenDoc::new(token, &fresh))
                            .await?
                            .is_some();
                        // A duplicate with no record under this token means the
                        // artifact already owns a different one
                        if !inserted && self.load(token).await?.is_none() {
                            return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
                        }
                        continue;
                    }
                },
            };

            let next = match current.to_record().try_consume(exso_id, now) {
                Ok(next) => next,
                Err(reason) => {
                    debug!(token = %token_fingerprint(token), reason = reason.as_str(), "Share token rejected");
                    return Ok(ConsumeOutcome::Rejected(reason));
                }
            };

            let swapped = self
                .collection
                .update_one(
                    doc! {
                        "token": token,
                        "exso_id": exso_id,
                        "uses_remaining": current.uses_remaining,
                    },
                    doc! {
                        "$set": {
                            "uses_remaining": i64::from(next.uses_remaining),
                            "last_opened_at_ms": to_millis(now),
                            "metadata.updated_at": bson::DateTime::now(),
                        }
                    },
                )
                .await?;

            if swapped.matched_count == 1 {
                return Ok(ConsumeOutcome::Consumed {
                    uses_remaining: next.uses_remaining,
                });
            }
            debug!(token = %token_fingerprint(token), attempt, "Lost share token race, retrying");
        }

        warn!(token = %token_fingerprint(token), "Share token consume retries exhausted");
        Err(GatewayError::Busy(format!("share token {}", token_fingerprint(token))))
    }

    async fn peek(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        Ok(self.load(token).await?.map(|d| d.to_record()))
    }

    fn quota(&self) -> u32 {
        self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_issue_consume_until_exhausted() {
        let ledger = MemoryTokenLedger::new(2, IssuePolicy::RequireIssued);
        let token = ledger.issue("x").await.unwrap();

        assert_eq!(
            ledger.consume(&token, "x").await.unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 1 }
        );
        assert_eq!(
            ledger.consume(&token, "x").await.unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 0 }
        );
        assert_eq!(
            ledger.consume(&token, "x").await.unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Exhausted)
        );
    }

    #[tokio::test]
    async fn test_mismatch_does_not_spend() {
        let ledger = MemoryTokenLedger::new(2, IssuePolicy::RequireIssued);
        let token = ledger.issue("x").await.unwrap();

        assert_eq!(
            ledger.consume(&token, "y").await.unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Mismatch)
        );
        assert_eq!(ledger.peek(&token).await.unwrap().unwrap().uses_remaining, 2);
    }

    #[tokio::test]
    async fn test_unknown_token_follows_policy() {
        let strict = MemoryTokenLedger::new(2, IssuePolicy::RequireIssued);
        assert_eq!(
            strict.consume("nope", "x").await.unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Invalid)
        );
        assert!(strict.peek("nope").await.unwrap().is_none());

        let lazy = MemoryTokenLedger::new(2, IssuePolicy::LazyOnFirstConsume);
        assert_eq!(
            lazy.consume("fresh", "x").await.unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 1 }
        );
        assert_eq!(lazy.peek("fresh").await.unwrap().unwrap().exso_id, "x");
    }

    #[tokio::test]
    async fn test_reissue_is_refused() {
        let ledger = MemoryTokenLedger::new(2, IssuePolicy::RequireIssued);
        let token = ledger.issue("x").await.unwrap();
        ledger.consume(&token, "x").await.unwrap();
        ledger.consume(&token, "x").await.unwrap();

        let err = ledger.issue("x").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvariantViolation(_)));
        assert_eq!(err.status_code().as_u16(), 409);
        assert_eq!(
            ledger.consume(&token, "x").await.unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Exhausted)
        );

        // Other artifacts are unaffected
        assert!(ledger.issue("y").await.is_ok());
    }

    #[tokio::test]
    async fn test_lazy_token_is_the_only_one() {
        let lazy = MemoryTokenLedger::new(1, IssuePolicy::LazyOnFirstConsume);
        assert_eq!(
            lazy.consume("first", "x").await.unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 0 }
        );
        assert_eq!(
            lazy.consume("second", "x").await.unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Invalid)
        );
        assert!(lazy.peek("second").await.unwrap().is_none());
        assert!(matches!(
            lazy.issue("x").await,
            Err(GatewayError::InvariantViolation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_respects_quota() {
        let ledger = Arc::new(MemoryTokenLedger::new(2, IssuePolicy::RequireIssued));
        let token = ledger.issue("x").await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let token = token.clone();
                tokio::spawn(async move { ledger.consume(&token, "x").await.unwrap() })
            })
            .collect();

        let mut consumed = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ConsumeOutcome::Consumed { .. } => consumed += 1,
                ConsumeOutcome::Rejected(ConsumeRejection::Exhausted) => exhausted += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!((consumed, exhausted), (2, 8));
    }
}
