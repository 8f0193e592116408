//! Artifact Store
//!
//! In-memory index backed by a durable local mirror (`exsoStore`, one JSON
//! map of id → artifact). The remote tier lives with the host that can do
//! network IO; this store only covers the device.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::storage::{read_json, write_json, LocalStore, ARTIFACT_MIRROR_KEY};
use crate::types::Artifact;

/// Reject a write that would change an already-set reply reference
pub fn check_reply_reference(next: &Artifact, previous: Option<&Artifact>) -> Result<()> {
    match previous.and_then(|p| p.reply_to_exso_id.as_ref()) {
        Some(existing) if next.reply_to_exso_id.as_ref() != Some(existing) => {
            Err(CoreError::ReplyReferenceImmutable {
                id: next.id.clone(),
            })
        }
        _ => Ok(()),
    }
}

pub struct ArtifactStore<S: LocalStore> {
    memory: Mutex<HashMap<String, Artifact>>,
    mirror: S,
}

impl<S: LocalStore> ArtifactStore<S> {
    pub fn new(mirror: S) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            mirror,
        }
    }

    pub fn mirror(&self) -> &S {
        &self.mirror
    }

    fn read_mirror(&self) -> HashMap<String, Artifact> {
        read_json(&self.mirror, ARTIFACT_MIRROR_KEY).unwrap_or_default()
    }

    /// Persist an artifact
    ///
    /// Fails with `ReplyReferenceImmutable` if a stored record with the same
    /// id already carries a different `replyToExsoId`. A failing mirror
    /// write is logged; the in-memory copy still succeeds.
    pub fn save(&self, artifact: &Artifact) -> Result<()> {
        let previous = self.get(&artifact.id);
        check_reply_reference(artifact, previous.as_ref())?;

        self.memory
            .lock()
            .map_err(|_| CoreError::Storage("artifact index poisoned".into()))?
            .insert(artifact.id.clone(), artifact.clone());

        let mut mirrored = self.read_mirror();
        mirrored.insert(artifact.id.clone(), artifact.clone());
        if let Err(e) = write_json(&self.mirror, ARTIFACT_MIRROR_KEY, &mirrored) {
            warn!(exso_id = %artifact.id, error = %e, "Failed to mirror artifact");
        }
        Ok(())
    }

    /// Look up by id: memory first, then the local mirror
    pub fn get(&self, id: &str) -> Option<Artifact> {
        if let Some(found) = self.memory.lock().ok()?.get(id).cloned() {
            return Some(found);
        }

        let found = self.read_mirror().remove(id)?;
        debug!(exso_id = %id, "Artifact restored from local mirror");
        if let Ok(mut memory) = self.memory.lock() {
            memory.insert(id.to_string(), found.clone());
        }
        Some(found)
    }

    /// Drop the durable mirror; the in-memory index is unaffected
    pub fn clear_mirror(&self) {
        self.mirror.remove_item(ARTIFACT_MIRROR_KEY);
    }
}
