//! Persisted local state
//!
//! Web-storage style key/value access (`LocalStore`) plus typed slots for
//! each piece of state the player and checkout flow keep on the viewer's
//! device. Every slot has its own clear operation. Reads of corrupt JSON
//! degrade to "absent".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};

pub const DRAFT_KEY: &str = "exso:draft";
pub const PROGRESS_KEY_PREFIX: &str = "exsoProgress:";
pub const SHARE_LINKS_KEY: &str = "xso:share-links";
pub const ARTIFACT_MIRROR_KEY: &str = "exsoStore";
pub const VERIFIED_PAID_KEY: &str = "xsoverse:paid";
pub const PAYMENT_NONCE_KEY: &str = "xsoverse:paymentNonce";
pub const PAYMENT_NONCE_AT_KEY: &str = "xsoverse:paymentNonceAt";
pub const CHECKOUT_SESSION_KEY: &str = "xsoverse:checkoutSessionId";
pub const CHECKOUT_SESSION_AT_KEY: &str = "xsoverse:checkoutSessionAt";

/// Payment nonces expire 15 minutes after issue
pub const PAYMENT_NONCE_TTL_MS: u64 = 15 * 60 * 1000;
/// Checkout session ids expire 30 minutes after issue
pub const CHECKOUT_SESSION_TTL_MS: u64 = 30 * 60 * 1000;

/// String key/value store with web-storage semantics
///
/// Implementations use interior mutability: a browser's `localStorage` is
/// shared by every handle to it.
pub trait LocalStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str);
}

impl<T: LocalStore + ?Sized> LocalStore for &T {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

/// In-process store, optionally with a byte quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once keys + values exceed `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| CoreError::Storage("memory store poisoned".into()))?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(CoreError::Storage(format!("quota exceeded writing {}", key)));
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.remove(key);
        }
    }
}

/// Read and parse a JSON value, treating corrupt data as absent
pub(crate) fn read_json<T, S>(store: &S, key: &str) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
    S: LocalStore + ?Sized,
{
    let raw = store.get_item(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring corrupt persisted value");
            None
        }
    }
}

pub(crate) fn write_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize,
    S: LocalStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set_item(key, &raw)
}

// =========================================================================
// Playback progress
// =========================================================================

/// Checkpointed playback position for one artifact on one device
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgress {
    #[serde(default)]
    pub elapsed_ms: f64,
    #[serde(default)]
    pub is_final_line: bool,
}

/// `exsoProgress:{id}` slot
pub struct ProgressSlot;

impl ProgressSlot {
    pub fn key(exso_id: &str) -> String {
        format!("{}{}", PROGRESS_KEY_PREFIX, exso_id)
    }

    pub fn load<S: LocalStore + ?Sized>(store: &S, exso_id: &str) -> Option<PlaybackProgress> {
        read_json(store, &Self::key(exso_id))
    }

    pub fn save<S: LocalStore + ?Sized>(
        store: &S,
        exso_id: &str,
        progress: &PlaybackProgress,
    ) -> Result<()> {
        write_json(store, &Self::key(exso_id), progress)
    }

    pub fn clear<S: LocalStore + ?Sized>(store: &S, exso_id: &str) {
        store.remove_item(&Self::key(exso_id));
    }
}

// =========================================================================
// Payment nonce, checkout session and verified flag
// =========================================================================

/// Client-side payment state with expiry windows
#[derive(Clone, Copy, Debug)]
pub struct PaymentSlots {
    pub nonce_ttl_ms: u64,
    pub checkout_ttl_ms: u64,
}

impl Default for PaymentSlots {
    fn default() -> Self {
        Self {
            nonce_ttl_ms: PAYMENT_NONCE_TTL_MS,
            checkout_ttl_ms: CHECKOUT_SESSION_TTL_MS,
        }
    }
}

impl PaymentSlots {
    /// Generate and store a fresh nonce (24 hex chars)
    pub fn issue_nonce<S: LocalStore + ?Sized>(&self, store: &S, now_ms: u64) -> Result<String> {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        store.set_item(PAYMENT_NONCE_KEY, &nonce)?;
        store.set_item(PAYMENT_NONCE_AT_KEY, &now_ms.to_string())?;
        Ok(nonce)
    }

    /// The stored nonce if present and not expired
    pub fn read_nonce<S: LocalStore + ?Sized>(&self, store: &S, now_ms: u64) -> Option<String> {
        read_timed(store, PAYMENT_NONCE_KEY, PAYMENT_NONCE_AT_KEY, self.nonce_ttl_ms, now_ms)
    }

    pub fn has_valid_nonce<S: LocalStore + ?Sized>(&self, store: &S, now_ms: u64) -> bool {
        self.read_nonce(store, now_ms).is_some()
    }

    pub fn clear_nonce<S: LocalStore + ?Sized>(&self, store: &S) {
        store.remove_item(PAYMENT_NONCE_KEY);
        store.remove_item(PAYMENT_NONCE_AT_KEY);
    }

    pub fn store_checkout_session<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        session_id: &str,
        now_ms: u64,
    ) -> Result<()> {
        store.set_item(CHECKOUT_SESSION_KEY, session_id)?;
        store.set_item(CHECKOUT_SESSION_AT_KEY, &now_ms.to_string())
    }

    pub fn read_checkout_session<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        now_ms: u64,
    ) -> Option<String> {
        read_timed(
            store,
            CHECKOUT_SESSION_KEY,
            CHECKOUT_SESSION_AT_KEY,
            self.checkout_ttl_ms,
            now_ms,
        )
    }

    pub fn clear_checkout_session<S: LocalStore + ?Sized>(&self, store: &S) {
        store.remove_item(CHECKOUT_SESSION_KEY);
        store.remove_item(CHECKOUT_SESSION_AT_KEY);
    }

    pub fn set_verified<S: LocalStore + ?Sized>(&self, store: &S) -> Result<()> {
        store.set_item(VERIFIED_PAID_KEY, "true")
    }

    pub fn is_verified<S: LocalStore + ?Sized>(&self, store: &S) -> bool {
        store.get_item(VERIFIED_PAID_KEY).as_deref() == Some("true")
    }

    pub fn clear_verified<S: LocalStore + ?Sized>(&self, store: &S) {
        store.remove_item(VERIFIED_PAID_KEY);
    }
}

fn read_timed<S: LocalStore + ?Sized>(
    store: &S,
    value_key: &str,
    issued_key: &str,
    ttl_ms: u64,
    now_ms: u64,
) -> Option<String> {
    let value = store.get_item(value_key).filter(|v| !v.is_empty())?;
    let issued_at: u64 = store.get_item(issued_key)?.parse().ok()?;
    if issued_at == 0 || now_ms.saturating_sub(issued_at) > ttl_ms {
        return None;
    }
    Some(value)
}
