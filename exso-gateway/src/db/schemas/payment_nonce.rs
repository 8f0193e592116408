//! Payment nonce document schema
//!
//! One document per checkout reference. `expires_at` carries a TTL index so
//! MongoDB reaps stale nonces on its own.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for payment nonces
pub const PAYMENT_NONCE_COLLECTION: &str = "payment_nonces";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentNonceDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub nonce: String,

    /// Unix milliseconds the nonce was registered at
    #[serde(default)]
    pub registered_at_ms: i64,

    #[serde(default = "DateTime::now")]
    pub expires_at: DateTime,

    #[serde(default)]
    pub verified_at_ms: Option<i64>,

    #[serde(default)]
    pub event_name: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub checkout_id: Option<String>,
}

impl Default for PaymentNonceDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            nonce: String::new(),
            registered_at_ms: 0,
            expires_at: DateTime::now(),
            verified_at_ms: None,
            event_name: None,
            order_id: None,
            checkout_id: None,
        }
    }
}

impl IntoIndexes for PaymentNonceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "nonce": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("nonce_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PaymentNonceDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
