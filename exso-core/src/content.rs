//! Canonical text and environment media
//!
//! Text variants are compiled in from `content/*.json`, one file per exso
//! type, each indexed `[weight][identity]`.

use std::collections::HashMap;

use rand::Rng;
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::types::{ExsoType, Identity, Weight};

const THINKING_OF_YOU_JSON: &str = include_str!("../content/thinking_of_you.json");
const REPLY_JSON: &str = include_str!("../content/reply.json");

#[derive(Clone, Debug, Deserialize)]
struct VariantFile {
    variants: WeightVariants,
}

#[derive(Clone, Debug, Deserialize)]
struct WeightVariants {
    quiet: IdentityVariants,
    present: IdentityVariants,
    held: IdentityVariants,
}

#[derive(Clone, Debug, Deserialize)]
struct IdentityVariants {
    named: Vec<String>,
    anonymous: Vec<String>,
}

impl IdentityVariants {
    fn get(&self, identity: Identity) -> &[String] {
        match identity {
            Identity::Named => &self.named,
            Identity::Anonymous => &self.anonymous,
        }
    }
}

/// Text-line variants per exso type
#[derive(Clone, Debug)]
pub struct ContentRegistry {
    files: HashMap<ExsoType, VariantFile>,
}

impl ContentRegistry {
    /// Registry of the compiled-in texts
    pub fn builtin() -> Result<Self> {
        let mut registry = Self {
            files: HashMap::new(),
        };
        registry.load(ExsoType::ThinkingOfYou, THINKING_OF_YOU_JSON)?;
        registry.load(ExsoType::ReplyExso, REPLY_JSON)?;
        Ok(registry)
    }

    /// Parse and register a variant file, replacing any existing one
    pub fn load(&mut self, exso_type: ExsoType, raw: &str) -> Result<()> {
        let file: VariantFile = serde_json::from_str(raw)?;
        self.files.insert(exso_type, file);
        Ok(())
    }

    /// Lines for `[weight][identity]` of `exso_type`
    pub fn variant(&self, exso_type: ExsoType, weight: Weight, identity: Identity) -> Result<&[String]> {
        let file = self
            .files
            .get(&exso_type)
            .ok_or_else(|| CoreError::UnknownExsoType(exso_type.as_str().to_string()))?;

        let by_identity = match weight {
            Weight::Quiet => &file.variants.quiet,
            Weight::Present => &file.variants.present,
            Weight::Held => &file.variants.held,
            Weight::Unrecognized => return Err(CoreError::MissingDraftField("weight")),
        };
        Ok(by_identity.get(identity))
    }
}

/// Background media for one weight
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaEnvironment {
    pub video: String,
    pub audio: [String; 2],
}

impl MediaEnvironment {
    fn for_weight(weight: &str) -> Self {
        Self {
            video: format!("/environment/{}/video.mp4", weight),
            audio: [
                format!("/environment/{}/audio_1.mp3", weight),
                format!("/environment/{}/audio_2.mp3", weight),
            ],
        }
    }

    /// One of the two audio tracks, uniformly
    pub fn pick_audio<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.audio[rng.gen_range(0..self.audio.len())]
    }
}

/// Video fixed per weight, audio chosen from a per-weight pair
#[derive(Clone, Debug)]
pub struct EnvironmentTable {
    quiet: MediaEnvironment,
    present: MediaEnvironment,
    held: MediaEnvironment,
}

impl Default for EnvironmentTable {
    fn default() -> Self {
        Self {
            quiet: MediaEnvironment::for_weight("quiet"),
            present: MediaEnvironment::for_weight("present"),
            held: MediaEnvironment::for_weight("held"),
        }
    }
}

impl EnvironmentTable {
    pub fn select(&self, weight: Weight) -> Option<&MediaEnvironment> {
        match weight {
            Weight::Quiet => Some(&self.quiet),
            Weight::Present => Some(&self.present),
            Weight::Held => Some(&self.held),
            Weight::Unrecognized => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_builtin_has_every_variant() {
        let registry = ContentRegistry::builtin().unwrap();
        for exso_type in [ExsoType::ThinkingOfYou, ExsoType::ReplyExso] {
            for weight in [Weight::Quiet, Weight::Present, Weight::Held] {
                for identity in [Identity::Named, Identity::Anonymous] {
                    let lines = registry.variant(exso_type, weight, identity).unwrap();
                    assert!(lines.len() >= 3, "{:?}/{:?}/{:?}", exso_type, weight, identity);
                }
            }
        }
    }

    #[test]
    fn test_unknown_type_and_weight() {
        let empty = ContentRegistry {
            files: HashMap::new(),
        };
        assert_eq!(
            empty.variant(ExsoType::ReplyExso, Weight::Quiet, Identity::Named),
            Err(CoreError::UnknownExsoType("reply_exso".to_string()))
        );

        let registry = ContentRegistry::builtin().unwrap();
        assert!(registry
            .variant(ExsoType::ReplyExso, Weight::Unrecognized, Identity::Named)
            .is_err());
    }

    #[test]
    fn test_malformed_variant_file() {
        let mut registry = ContentRegistry::builtin().unwrap();
        assert!(matches!(
            registry.load(ExsoType::ReplyExso, r#"{"variants": {}}"#),
            Err(CoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_environment_selection() {
        let table = EnvironmentTable::default();
        let held = table.select(Weight::Held).unwrap();
        assert_eq!(held.video, "/environment/held/video.mp4");
        assert!(table.select(Weight::Unrecognized).is_none());

        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            seen.insert(held.pick_audio(&mut rng).to_string());
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("/environment/held/audio_1.mp3"));
    }
}
