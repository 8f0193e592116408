//! Share Token Registry
//!
//! Limited-use tokens bound to one artifact. The consume step is a
//! read-decrement-write on a single record, so tables expose
//! compare-and-swap and the registry retries when it loses a race. Quota is
//! never exceeded and counters never go below zero.
//!
//! The decision itself (`ShareTokenRecord::try_consume`) is pure and shared
//! with the gateway's server-side ledgers.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::storage::{read_json, write_json, LocalStore, SHARE_LINKS_KEY};

/// Opens allowed per token
pub const DEFAULT_SHARE_QUOTA: u32 = 2;

const MAX_ISSUE_ATTEMPTS: usize = 5;
const MAX_CONSUME_ATTEMPTS: usize = 16;

/// Persisted state of one share token
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShareTokenRecord {
    pub exso_id: String,
    pub uses_remaining: u32,
    pub created_at: u64,
    #[serde(default)]
    pub last_opened_at: Option<u64>,
}

impl ShareTokenRecord {
    pub fn new(exso_id: &str, quota: u32, now_ms: u64) -> Self {
        Self {
            exso_id: exso_id.to_string(),
            uses_remaining: quota,
            created_at: now_ms,
            last_opened_at: None,
        }
    }

    /// The record after one successful open, or why the open is refused
    pub fn try_consume(&self, exso_id: &str, now_ms: u64) -> std::result::Result<Self, ConsumeRejection> {
        if self.exso_id != exso_id {
            return Err(ConsumeRejection::Mismatch);
        }
        if self.uses_remaining == 0 {
            return Err(ConsumeRejection::Exhausted);
        }
        Ok(Self {
            uses_remaining: self.uses_remaining - 1,
            last_opened_at: Some(now_ms),
            ..self.clone()
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeRejection {
    Invalid,
    Mismatch,
    Exhausted,
}

impl ConsumeRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeRejection::Invalid => "invalid",
            ConsumeRejection::Mismatch => "mismatch",
            ConsumeRejection::Exhausted => "exhausted",
        }
    }
}

/// Result of presenting a token; serializes as `{ok, usesRemaining?, reason?}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "ConsumeReply")]
pub enum ConsumeOutcome {
    Consumed { uses_remaining: u32 },
    Rejected(ConsumeRejection),
}

impl ConsumeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConsumeOutcome::Consumed { .. })
    }

    pub fn uses_remaining(&self) -> Option<u32> {
        match self {
            ConsumeOutcome::Consumed { uses_remaining } => Some(*uses_remaining),
            ConsumeOutcome::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<ConsumeRejection> {
        match self {
            ConsumeOutcome::Consumed { .. } => None,
            ConsumeOutcome::Rejected(reason) => Some(*reason),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsumeReply {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uses_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ConsumeRejection>,
}

impl From<ConsumeOutcome> for ConsumeReply {
    fn from(outcome: ConsumeOutcome) -> Self {
        Self {
            ok: outcome.is_ok(),
            uses_remaining: outcome.uses_remaining(),
            reason: outcome.reason(),
        }
    }
}

/// How unknown tokens are treated on consume
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IssuePolicy {
    /// Unknown tokens are created at full quota, bound to the presented id.
    /// Only for hosts where issue and consume cannot share a store.
    LazyOnFirstConsume,
    /// Unknown tokens are invalid
    #[default]
    RequireIssued,
}

/// Short, log-safe digest of a token
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

// ============================================================================
// Tables
// ============================================================================

/// Backing store for token records
pub trait TokenTable {
    fn load(&self, token: &str) -> Result<Option<ShareTokenRecord>>;

    /// Replace the record for `token` with `next` if it still equals
    /// `expected` (`None` means "absent"). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        token: &str,
        expected: Option<&ShareTokenRecord>,
        next: &ShareTokenRecord,
    ) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenTable {
    records: Mutex<HashMap<String, ShareTokenRecord>>,
}

impl MemoryTokenTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenTable for MemoryTokenTable {
    fn load(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| CoreError::Storage("token table poisoned".into()))?;
        Ok(records.get(token).cloned())
    }

    fn compare_and_swap(
        &self,
        token: &str,
        expected: Option<&ShareTokenRecord>,
        next: &ShareTokenRecord,
    ) -> Result<bool> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CoreError::Storage("token table poisoned".into()))?;
        if records.get(token) != expected {
            return Ok(false);
        }
        records.insert(token.to_string(), next.clone());
        Ok(true)
    }
}

/// Token table kept as one JSON map under `xso:share-links`
///
/// Other tabs may write the same key; the swap re-reads the map and compares
/// before writing.
pub struct LocalTokenTable<S: LocalStore> {
    store: S,
    guard: Mutex<()>,
}

impl<S: LocalStore> LocalTokenTable<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_all(&self) -> HashMap<String, ShareTokenRecord> {
        read_json(&self.store, SHARE_LINKS_KEY).unwrap_or_default()
    }

    /// Forget every token on this device
    pub fn clear(&self) {
        self.store.remove_item(SHARE_LINKS_KEY);
    }
}

impl<S: LocalStore> TokenTable for LocalTokenTable<S> {
    fn load(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        Ok(self.read_all().remove(token))
    }

    fn compare_and_swap(
        &self,
        token: &str,
        expected: Option<&ShareTokenRecord>,
        next: &ShareTokenRecord,
    ) -> Result<bool> {
        let _held = self
            .guard
            .lock()
            .map_err(|_| CoreError::Storage("token table poisoned".into()))?;

        let mut all = self.read_all();
        if all.get(token) != expected {
            return Ok(false);
        }
        all.insert(token.to_string(), next.clone());
        write_json(&self.store, SHARE_LINKS_KEY, &all)?;
        Ok(true)
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct ShareTokenRegistry<T: TokenTable> {
    table: T,
    quota: u32,
    policy: IssuePolicy,
}

impl<T: TokenTable> ShareTokenRegistry<T> {
    pub fn new(table: T) -> Self {
        Self::with_policy(table, DEFAULT_SHARE_QUOTA, IssuePolicy::default())
    }

    pub fn with_policy(table: T, quota: u32, policy: IssuePolicy) -> Self {
        Self {
            table,
            quota,
            policy,
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Create a new token for `exso_id`, retrying on collision
    pub fn issue(&self, exso_id: &str, now_ms: u64) -> Result<String> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = uuid::Uuid::new_v4().simple().to_string();
            if self.table.load(&token)?.is_some() {
                continue;
            }
            let record = ShareTokenRecord::new(exso_id, self.quota, now_ms);
            if self.table.compare_and_swap(&token, None, &record)? {
                info!(exso_id, token = %token_fingerprint(&token), "Issued share token");
                return Ok(token);
            }
        }
        Err(CoreError::Contention("share token issue".into()))
    }

    /// Spend one open of `token` against `exso_id`
    ///
    /// Rejections leave the stored record untouched.
    pub fn consume(&self, token: &str, exso_id: &str, now_ms: u64) -> Result<ConsumeOutcome> {
        if token.is_empty() {
            return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
        }

        for attempt in 0..MAX_CONSUME_ATTEMPTS {
            let current = self.table.load(token)?;
            let base = match (&current, self.policy) {
                (Some(record), _) => record.clone(),
                (None, IssuePolicy::LazyOnFirstConsume) => {
                    ShareTokenRecord::new(exso_id, self.quota, now_ms)
                }
                (None, IssuePolicy::RequireIssued) => {
                    return Ok(ConsumeOutcome::Rejected(ConsumeRejection::Invalid));
                }
            };

            let next = match base.try_consume(exso_id, now_ms) {
                Ok(next) => next,
                Err(reason) => {
                    debug!(token = %token_fingerprint(token), reason = reason.as_str(), "Share token rejected");
                    return Ok(ConsumeOutcome::Rejected(reason));
                }
            };

            if self.table.compare_and_swap(token, current.as_ref(), &next)? {
                return Ok(ConsumeOutcome::Consumed {
                    uses_remaining: next.uses_remaining,
                });
            }
            debug!(token = %token_fingerprint(token), attempt, "Lost share token race, retrying");
        }

        warn!(token = %token_fingerprint(token), "Share token consume retries exhausted");
        Err(CoreError::Contention(format!("share token {}", token_fingerprint(token))))
    }

    /// Read-only lookup for remaining-uses displays
    pub fn peek(&self, token: &str) -> Result<Option<ShareTokenRecord>> {
        self.table.load(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_try_consume_rules() {
        let record = ShareTokenRecord::new("a", 1, 10);
        assert_eq!(record.try_consume("b", 20), Err(ConsumeRejection::Mismatch));

        let next = record.try_consume("a", 20).unwrap();
        assert_eq!(next.uses_remaining, 0);
        assert_eq!(next.last_opened_at, Some(20));
        assert_eq!(next.created_at, 10);
        assert_eq!(next.try_consume("a", 30), Err(ConsumeRejection::Exhausted));
    }

    #[test]
    fn test_quota_of_two() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let token = registry.issue("exso-1", 0).unwrap();
        assert_eq!(registry.peek(&token).unwrap().unwrap().uses_remaining, 2);

        assert_eq!(
            registry.consume(&token, "exso-1", 1).unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 1 }
        );
        assert_eq!(
            registry.consume(&token, "exso-1", 2).unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 0 }
        );
        assert_eq!(
            registry.consume(&token, "exso-1", 3).unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Exhausted)
        );
        assert_eq!(registry.peek(&token).unwrap().unwrap().uses_remaining, 0);
    }

    #[test]
    fn test_mismatch_does_not_decrement() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let token = registry.issue("exso-1", 0).unwrap();

        assert_eq!(
            registry.consume(&token, "exso-2", 1).unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Mismatch)
        );
        let record = registry.peek(&token).unwrap().unwrap();
        assert_eq!(record.uses_remaining, 2);
        assert_eq!(record.last_opened_at, None);
    }

    #[test]
    fn test_unknown_token_policies() {
        let strict = ShareTokenRegistry::new(MemoryTokenTable::new());
        assert_eq!(
            strict.consume("nope", "exso-1", 1).unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Invalid)
        );
        assert_eq!(strict.peek("nope").unwrap(), None);
        assert_eq!(
            strict.consume("", "exso-1", 1).unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Invalid)
        );

        let lazy = ShareTokenRegistry::with_policy(
            MemoryTokenTable::new(),
            DEFAULT_SHARE_QUOTA,
            IssuePolicy::LazyOnFirstConsume,
        );
        assert_eq!(
            lazy.consume("fresh", "exso-1", 1).unwrap(),
            ConsumeOutcome::Consumed { uses_remaining: 1 }
        );
        assert_eq!(lazy.peek("fresh").unwrap().unwrap().exso_id, "exso-1");
        assert_eq!(
            lazy.consume("fresh", "exso-9", 2).unwrap(),
            ConsumeOutcome::Rejected(ConsumeRejection::Mismatch)
        );
    }

    #[test]
    fn test_concurrent_consume_respects_quota() {
        let registry = ShareTokenRegistry::new(MemoryTokenTable::new());
        let token = registry.issue("exso-1", 0).unwrap();
        let consumed = AtomicUsize::new(0);
        let exhausted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..12 {
                let (registry, token) = (&registry, &token);
                let (consumed, exhausted) = (&consumed, &exhausted);
                scope.spawn(move || match registry.consume(token, "exso-1", i).unwrap() {
                    ConsumeOutcome::Consumed { .. } => {
                        consumed.fetch_add(1, Ordering::SeqCst);
                    }
                    ConsumeOutcome::Rejected(ConsumeRejection::Exhausted) => {
                        exhausted.fetch_add(1, Ordering::SeqCst);
                    }
                    other => panic!("unexpected outcome {:?}", other),
                });
            }
        });

        assert_eq!(consumed.load(Ordering::SeqCst), 2);
        assert_eq!(exhausted.load(Ordering::SeqCst), 10);
        assert_eq!(registry.peek(&token).unwrap().unwrap().uses_remaining, 0);
    }

    #[test]
    fn test_local_table_persists_under_share_links_key() {
        let registry = ShareTokenRegistry::new(LocalTokenTable::new(MemoryStore::new()));
        let token = registry.issue("exso-1", 5).unwrap();
        registry.consume(&token, "exso-1", 6).unwrap();

        let raw = registry.table().store().get_item(SHARE_LINKS_KEY).unwrap();
        let map: HashMap<String, ShareTokenRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(map[&token].uses_remaining, 1);
        assert_eq!(map[&token].last_opened_at, Some(6));

        registry.table().clear();
        assert_eq!(registry.peek(&token).unwrap(), None);
    }

    #[test]
    fn test_local_table_swap_detects_foreign_write() {
        let table = LocalTokenTable::new(MemoryStore::new());
        let original = ShareTokenRecord::new("exso-1", 2, 0);
        assert!(table.compare_and_swap("t", None, &original).unwrap());

        // Another tab spends a use behind our back
        let foreign = original.try_consume("exso-1", 1).unwrap();
        assert!(table.compare_and_swap("t", Some(&original), &foreign).unwrap());

        let stale = original.try_consume("exso-1", 2).unwrap();
        assert!(!table.compare_and_swap("t", Some(&original), &stale).unwrap());
        assert!(!table.compare_and_swap("t", None, &original).unwrap());
    }

    #[test]
    fn test_outcome_wire_format() {
        let ok = serde_json::to_value(ConsumeOutcome::Consumed { uses_remaining: 0 }).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "usesRemaining": 0}));

        let rejected =
            serde_json::to_value(ConsumeOutcome::Rejected(ConsumeRejection::Exhausted)).unwrap();
        assert_eq!(rejected, serde_json::json!({"ok": false, "reason": "exhausted"}));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(token_fingerprint("abc"), token_fingerprint("abc"));
        assert_eq!(token_fingerprint("abc").len(), 12);
        assert_ne!(token_fingerprint("abc"), token_fingerprint("abd"));
    }
}
