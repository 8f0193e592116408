//! Server-side artifact persistence
//!
//! The remote tier behind the Artifact Store. Both implementations keep the
//! `replyToExsoId` immutability check atomic with the write.

use async_trait::async_trait;
use bson::doc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use exso_core::{check_reply_reference, Artifact};
use tracing::{debug, info, warn};

use crate::db::schemas::{ArtifactDoc, Metadata, ARTIFACT_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{GatewayError, Result};

/// Attempts before a contended save gives up
const MAX_SAVE_ATTEMPTS: usize = 4;

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn get(&self, exso_id: &str) -> Result<Option<Artifact>>;

    /// Insert or replace; fails with `InvariantViolation` if the stored
    /// record already has a different reply reference
    async fn save(&self, artifact: &Artifact) -> Result<()>;
}

/// Process-local repository
#[derive(Default)]
pub struct MemoryArtifactRepository {
    artifacts: DashMap<String, Artifact>,
}

impl MemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactRepository for MemoryArtifactRepository {
    async fn get(&self, exso_id: &str) -> Result<Option<Artifact>> {
        Ok(self.artifacts.get(exso_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, artifact: &Artifact) -> Result<()> {
        match self.artifacts.entry(artifact.id.clone()) {
            Entry::Occupied(mut occupied) => {
                check_reply_reference(artifact, Some(occupied.get()))?;
                occupied.insert(artifact.clone());
                debug!(exso_id = %artifact.id, "Artifact replaced");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(artifact.clone());
                info!(exso_id = %artifact.id, "Artifact stored");
            }
        }
        Ok(())
    }
}

/// MongoDB-backed repository
pub struct MongoArtifactRepository {
    collection: MongoCollection<ArtifactDoc>,
}

impl MongoArtifactRepository {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(ARTIFACT_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl ArtifactRepository for MongoArtifactRepository {
    async fn get(&self, exso_id: &str) -> Result<Option<Artifact>> {
        let found = self.collection.find_one(doc! { "exso_id": exso_id }).await?;
        Ok(found.and_then(|d| d.artifact))
    }

    async fn save(&self, artifact: &Artifact) -> Result<()> {
        for attempt in 0..MAX_SAVE_ATTEMPTS {
            let existing = self
                .collection
                .find_one(doc! { "exso_id": &artifact.id })
                .await?;

            let Some(existing) = existing else {
                if self.collection.try_insert_one(ArtifactDoc::new(artifact)).await?.is_some() {
                    info!(exso_id = %artifact.id, "Artifact stored");
                    return Ok(());
                }
                debug!(exso_id = %artifact.id, attempt, "Concurrent insert, re-checking");
                continue;
            };

            check_reply_reference(artifact, existing.artifact.as_ref())?;

            // Only replace the version we checked against
            let mut set = doc! {
                "artifact": bson::to_bson(artifact)?,
                "reply_to_exso_id": bson::to_bson(&artifact.reply_to_exso_id)?,
            };
            set.extend(Metadata::touched());
            let result = self
                .collection
                .update_one(
                    doc! {
                        "exso_id": &artifact.id,
                        "reply_to_exso_id": bson::to_bson(&existing.reply_to_exso_id)?,
                    },
                    doc! { "$set": set },
                )
                .await?;

            if result.matched_count == 1 {
                debug!(exso_id = %artifact.id, "Artifact replaced");
                return Ok(());
            }
            debug!(exso_id = %artifact.id, attempt, "Artifact changed underneath, retrying");
        }

        warn!(exso_id = %artifact.id, "Artifact save retries exhausted");
        Err(GatewayError::Busy(format!("artifact {}", artifact.id)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use exso_core::{ExsoType, Identity, Weight};

    pub(crate) fn artifact(id: &str, reply_to: Option<&str>) -> Artifact {
        Artifact {
            id: id.to_string(),
            exso_type: if reply_to.is_some() {
                ExsoType::ReplyExso
            } else {
                ExsoType::ThinkingOfYou
            },
            weight: Weight::Quiet,
            identity: Identity::Anonymous,
            sender_name: None,
            receiver_name: None,
            letter_text: None,
            show_letter_on_end: false,
            text: vec!["one".into(), "two".into(), "three".into()],
            video: "/environment/quiet/video.mp4".into(),
            audio: "/environment/quiet/audio_1.mp3".into(),
            created_at: 1_000,
            reply_to_exso_id: reply_to.map(str::to_string),
            opened_at: None,
            refunded_at: None,
        }
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let repo = MemoryArtifactRepository::new();
        assert!(repo.get("a").await.unwrap().is_none());

        repo.save(&artifact("a", None)).await.unwrap();
        assert_eq!(repo.get("a").await.unwrap(), Some(artifact("a", None)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_reference_cannot_change() {
        let repo = MemoryArtifactRepository::new();
        repo.save(&artifact("r", Some("first"))).await.unwrap();

        let err = repo.save(&artifact("r", Some("second"))).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvariantViolation(_)));

        let err = repo.save(&artifact("r", None)).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvariantViolation(_)));

        assert_eq!(
            repo.get("r").await.unwrap().unwrap().reply_to_exso_id.as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_same_reference_or_first_reference_is_accepted() {
        let repo = MemoryArtifactRepository::new();
        repo.save(&artifact("r", Some("first"))).await.unwrap();
        let mut updated = artifact("r", Some("first"));
        updated.opened_at = Some(5);
        repo.save(&updated).await.unwrap();

        repo.save(&artifact("s", None)).await.unwrap();
        repo.save(&artifact("s", Some("later"))).await.unwrap();
    }
}
