//! Artifact document schema
//!
//! The artifact record is embedded as-is; `exso_id` and `reply_to_exso_id`
//! are lifted to the top level for the unique index and for the
//! compare-and-swap filter that keeps the reply reference immutable.

use bson::{doc, oid::ObjectId, Document};
use exso_core::Artifact;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for artifacts
pub const ARTIFACT_COLLECTION: &str = "artifacts";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ArtifactDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub exso_id: String,

    /// Absent and null both mean "not a reply"
    #[serde(default)]
    pub reply_to_exso_id: Option<String>,

    #[serde(default)]
    pub artifact: Option<Artifact>,
}

impl ArtifactDoc {
    pub fn new(artifact: &Artifact) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            exso_id: artifact.id.clone(),
            reply_to_exso_id: artifact.reply_to_exso_id.clone(),
            artifact: Some(artifact.clone()),
        }
    }
}

impl IntoIndexes for ArtifactDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "exso_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("exso_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ArtifactDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
