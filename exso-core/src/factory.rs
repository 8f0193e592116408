//! Artifact Factory: finalized draft → immutable artifact record

use rand::Rng;
use tracing::info;

use crate::content::{ContentRegistry, EnvironmentTable};
use crate::draft::ExsoDraft;
use crate::error::{CoreError, Result};
use crate::types::Artifact;

#[derive(Clone, Debug)]
pub struct ArtifactFactory {
    content: ContentRegistry,
    environments: EnvironmentTable,
}

impl ArtifactFactory {
    pub fn new(content: ContentRegistry, environments: EnvironmentTable) -> Self {
        Self {
            content,
            environments,
        }
    }

    /// Factory over the compiled-in texts and default media
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(ContentRegistry::builtin()?, EnvironmentTable::default()))
    }

    pub fn create(&self, draft: &ExsoDraft) -> Result<Artifact> {
        self.create_with_rng(draft, &mut rand::thread_rng(), crate::current_time_ms())
    }

    /// Build an artifact with an explicit RNG and clock
    ///
    /// Requires type, identity and weight; the wizard is expected to stop
    /// incomplete drafts before they get here.
    pub fn create_with_rng<R: Rng + ?Sized>(
        &self,
        draft: &ExsoDraft,
        rng: &mut R,
        now_ms: u64,
    ) -> Result<Artifact> {
        let exso_type = draft.exso_type.ok_or(CoreError::MissingDraftField("type"))?;
        let identity = draft.identity.ok_or(CoreError::MissingDraftField("identity"))?;
        let weight = draft
            .weight
            .filter(|w| w.is_known())
            .ok_or(CoreError::MissingDraftField("weight"))?;

        let text = self.content.variant(exso_type, weight, identity)?.to_vec();
        let environment = self
            .environments
            .select(weight)
            .ok_or(CoreError::MissingDraftField("weight"))?;
        let audio = environment.pick_audio(rng).to_string();

        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string();

        let artifact = Artifact {
            id,
            exso_type,
            weight,
            identity,
            sender_name: non_blank(&draft.sender_name),
            receiver_name: non_blank(&draft.receiver_name),
            letter_text: non_blank(&draft.context),
            show_letter_on_end: draft.show_letter_on_end.unwrap_or(false),
            text,
            video: environment.video.clone(),
            audio,
            created_at: now_ms,
            reply_to_exso_id: non_blank(&draft.reply_to_exso_id),
            opened_at: None,
            refunded_at: None,
        };

        info!(
            exso_id = %artifact.id,
            exso_type = exso_type.as_str(),
            weight = weight.as_str(),
            "Created exso"
        );
        Ok(artifact)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExsoType, Identity, Weight};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn complete_draft() -> ExsoDraft {
        ExsoDraft {
            exso_type: Some(ExsoType::ThinkingOfYou),
            identity: Some(Identity::Named),
            weight: Some(Weight::Present),
            sender_name: Some(" Ana ".to_string()),
            context: Some("   ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_from_complete_draft() {
        let factory = ArtifactFactory::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let artifact = factory
            .create_with_rng(&complete_draft(), &mut rng, 1_234)
            .unwrap();

        let expected = ContentRegistry::builtin()
            .unwrap()
            .variant(ExsoType::ThinkingOfYou, Weight::Present, Identity::Named)
            .unwrap()
            .to_vec();
        assert_eq!(artifact.text, expected);
        assert_eq!(artifact.video, "/environment/present/video.mp4");
        assert!(artifact.audio.starts_with("/environment/present/audio_"));
        assert_eq!(artifact.created_at, 1_234);
        assert_eq!(artifact.sender_name.as_deref(), Some("Ana"));
        assert_eq!(artifact.letter_text, None);
        assert_eq!(artifact.id.len(), 36);
    }

    #[test]
    fn test_ids_are_unique() {
        let factory = ArtifactFactory::builtin().unwrap();
        let a = factory.create(&complete_draft()).unwrap();
        let b = factory.create(&complete_draft()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let factory = ArtifactFactory::builtin().unwrap();

        let mut draft = complete_draft();
        draft.exso_type = None;
        assert_eq!(factory.create(&draft), Err(CoreError::MissingDraftField("type")));

        let mut draft = complete_draft();
        draft.identity = None;
        assert_eq!(factory.create(&draft), Err(CoreError::MissingDraftField("identity")));

        let mut draft = complete_draft();
        draft.weight = Some(Weight::Unrecognized);
        assert_eq!(factory.create(&draft), Err(CoreError::MissingDraftField("weight")));
    }

    #[test]
    fn test_reply_reference_carried_over() {
        let factory = ArtifactFactory::builtin().unwrap();
        let mut draft = complete_draft();
        draft.exso_type = Some(ExsoType::ReplyExso);
        draft.reply_to_exso_id = Some("prev".to_string());
        let artifact = factory.create(&draft).unwrap();
        assert!(artifact.is_reply());
        assert_eq!(artifact.exso_type, ExsoType::ReplyExso);
    }
}
