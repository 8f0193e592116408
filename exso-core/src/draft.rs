//! Draft context
//!
//! The in-progress selection state is an owned value passed between wizard
//! steps (`DraftSession`), persisted explicitly at session edges through
//! `DraftSlot`, and consumed once by `finalize`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::factory::ArtifactFactory;
use crate::storage::{read_json, write_json, LocalStore, DRAFT_KEY};
use crate::types::{Artifact, ExsoType, Identity, Weight};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExsoDraft {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub exso_type: Option<ExsoType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Weight>,
    /// Letter text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_exso_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_letter_on_end: Option<bool>,
}

impl ExsoDraft {
    pub fn is_complete(&self) -> bool {
        self.exso_type.is_some()
            && self.identity.is_some()
            && self.weight.map(|w| w.is_known()).unwrap_or(false)
    }
}

/// `exso:draft` slot
pub struct DraftSlot;

impl DraftSlot {
    pub fn load<S: LocalStore + ?Sized>(store: &S) -> Option<ExsoDraft> {
        read_json(store, DRAFT_KEY)
    }

    pub fn save<S: LocalStore + ?Sized>(store: &S, draft: &ExsoDraft) -> Result<()> {
        write_json(store, DRAFT_KEY, draft)
    }

    pub fn clear<S: LocalStore + ?Sized>(store: &S) {
        store.remove_item(DRAFT_KEY);
    }
}

/// Owned draft threaded through the creation steps
pub struct DraftSession<S: LocalStore> {
    draft: ExsoDraft,
    store: S,
}

impl<S: LocalStore> DraftSession<S> {
    /// Start empty
    pub fn new(store: S) -> Self {
        Self {
            draft: ExsoDraft::default(),
            store,
        }
    }

    /// Resume whatever an earlier step persisted (empty if none or corrupt)
    pub fn restore(store: S) -> Self {
        let draft = DraftSlot::load(&store).unwrap_or_default();
        Self { draft, store }
    }

    /// Start a reply to `exso_id`
    pub fn for_reply(store: S, exso_id: &str) -> Self {
        let mut session = Self::new(store);
        session.draft.exso_type = Some(ExsoType::ReplyExso);
        session.draft.reply_to_exso_id = Some(exso_id.to_string());
        session
    }

    pub fn draft(&self) -> &ExsoDraft {
        &self.draft
    }

    pub fn set_type(&mut self, exso_type: ExsoType) -> &mut Self {
        self.draft.exso_type = Some(exso_type);
        self
    }

    pub fn set_identity(&mut self, identity: Identity) -> &mut Self {
        self.draft.identity = Some(identity);
        self
    }

    pub fn set_weight(&mut self, weight: Weight) -> &mut Self {
        self.draft.weight = Some(weight);
        self
    }

    pub fn set_context(&mut self, letter: impl Into<String>) -> &mut Self {
        self.draft.context = Some(letter.into());
        self
    }

    pub fn set_sender_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.draft.sender_name = Some(name.into());
        self
    }

    pub fn set_receiver_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.draft.receiver_name = Some(name.into());
        self
    }

    pub fn set_show_letter_on_end(&mut self, show: bool) -> &mut Self {
        self.draft.show_letter_on_end = Some(show);
        self
    }

    pub fn persist(&self) -> Result<()> {
        DraftSlot::save(&self.store, &self.draft)
    }

    /// Reset to empty and drop the persisted copy
    pub fn clear(&mut self) {
        self.draft = ExsoDraft::default();
        DraftSlot::clear(&self.store);
    }

    /// Turn the draft into an artifact; the draft is cleared only on success
    pub fn finalize(&mut self, factory: &ArtifactFactory) -> Result<Artifact> {
        let artifact = factory.create(&self.draft)?;
        debug!(exso_id = %artifact.id, "Draft finalized");
        self.clear();
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::MemoryStore;

    #[test]
    fn test_steps_persist_and_restore() {
        let store = MemoryStore::new();
        let mut session = DraftSession::new(&store);
        session
            .set_type(ExsoType::ThinkingOfYou)
            .set_identity(Identity::Anonymous)
            .set_receiver_name("Sam");
        session.persist().unwrap();

        let mut next_step = DraftSession::restore(&store);
        assert_eq!(next_step.draft(), session.draft());
        next_step.set_weight(Weight::Quiet);
        assert!(next_step.draft().is_complete());
    }

    #[test]
    fn test_draft_wire_format() {
        let draft = ExsoDraft {
            exso_type: Some(ExsoType::ReplyExso),
            reply_to_exso_id: Some("prev".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json, serde_json::json!({"type": "reply_exso", "replyToExsoId": "prev"}));
    }

    #[test]
    fn test_corrupt_persisted_draft_restores_empty() {
        let store = MemoryStore::new();
        store.set_item(DRAFT_KEY, "nope").unwrap();
        let session = DraftSession::restore(&store);
        assert_eq!(session.draft(), &ExsoDraft::default());
    }

    #[test]
    fn test_finalize_consumes_once() {
        let store = MemoryStore::new();
        let factory = ArtifactFactory::builtin().unwrap();
        let mut session = DraftSession::for_reply(&store, "prev");
        session.set_identity(Identity::Named).set_weight(Weight::Held);
        session.persist().unwrap();

        let artifact = session.finalize(&factory).unwrap();
        assert_eq!(artifact.reply_to_exso_id.as_deref(), Some("prev"));
        assert_eq!(session.draft(), &ExsoDraft::default());
        assert_eq!(DraftSlot::load(&store), None);

        assert_eq!(
            session.finalize(&factory),
            Err(CoreError::MissingDraftField("type"))
        );
    }

    #[test]
    fn test_failed_finalize_keeps_draft() {
        let store = MemoryStore::new();
        let factory = ArtifactFactory::builtin().unwrap();
        let mut session = DraftSession::new(&store);
        session.set_type(ExsoType::ThinkingOfYou);
        session.persist().unwrap();

        assert!(session.finalize(&factory).is_err());
        assert_eq!(session.draft().exso_type, Some(ExsoType::ThinkingOfYou));
        assert!(DraftSlot::load(&store).is_some());
    }
}
