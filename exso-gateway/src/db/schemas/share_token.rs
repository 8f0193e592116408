//! Share token document schema

use bson::{doc, oid::ObjectId, Document};
use exso_core::ShareTokenRecord;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for share tokens
pub const SHARE_TOKEN_COLLECTION: &str = "share_tokens";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ShareTokenDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub exso_id: String,

    #[serde(default)]
    pub uses_remaining: i64,

    /// Unix milliseconds
    #[serde(default)]
    pub created_at_ms: i64,

    #[serde(default)]
    pub last_opened_at_ms: Option<i64>,
}

impl ShareTokenDoc {
    pub fn new(token: &str, record: &ShareTokenRecord) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            token: token.to_string(),
            exso_id: record.exso_id.clone(),
            uses_remaining: i64::from(record.uses_remaining),
            created_at_ms: to_millis(record.created_at),
            last_opened_at_ms: record.last_opened_at.map(to_millis),
        }
    }

    pub fn to_record(&self) -> ShareTokenRecord {
        ShareTokenRecord {
            exso_id: self.exso_id.clone(),
            uses_remaining: u32::try_from(self.uses_remaining.max(0)).unwrap_or(u32::MAX),
            created_at: self.created_at_ms.max(0) as u64,
            last_opened_at: self.last_opened_at_ms.map(|ms| ms.max(0) as u64),
        }
    }
}

pub(crate) fn to_millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl IntoIndexes for ShareTokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "token": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("token_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "exso_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("exso_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ShareTokenDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
