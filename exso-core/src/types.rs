//! Artifact (Exso) record and its enumerations

use serde::{Deserialize, Serialize};

/// Kind of experience
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExsoType {
    ThinkingOfYou,
    ReplyExso,
}

impl ExsoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExsoType::ThinkingOfYou => "thinking_of_you",
            ExsoType::ReplyExso => "reply_exso",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "thinking_of_you" => Some(ExsoType::ThinkingOfYou),
            "reply_exso" => Some(ExsoType::ReplyExso),
            _ => None,
        }
    }
}

/// Emotional-intensity tier
///
/// Controls the opacity ceiling of the text layer and which background
/// environment is chosen. Records written by other clients may carry a weight
/// this build does not know; those deserialize as `Unrecognized`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    Quiet,
    Present,
    Held,
    #[serde(other)]
    Unrecognized,
}

impl Weight {
    /// Maximum opacity a text line reaches under this weight
    pub fn opacity_ceiling(&self) -> f64 {
        match self {
            Weight::Quiet => 0.85,
            Weight::Present => 0.92,
            Weight::Held => 1.0,
            Weight::Unrecognized => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weight::Quiet => "quiet",
            Weight::Present => "present",
            Weight::Held => "held",
            Weight::Unrecognized => "unrecognized",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "quiet" => Weight::Quiet,
            "present" => Weight::Present,
            "held" => Weight::Held,
            _ => Weight::Unrecognized,
        }
    }

    /// Weights a draft may be finalized with
    pub fn is_known(&self) -> bool {
        !matches!(self, Weight::Unrecognized)
    }
}

/// Whether the sender discloses their name
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    Named,
    Anonymous,
}

impl Identity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Identity::Named => "named",
            Identity::Anonymous => "anonymous",
        }
    }
}

/// The shareable content unit
///
/// Created once by the factory, read-only afterwards. JSON field names match
/// the wire format used by `/artifact` and embedded payload links.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub exso_type: ExsoType,
    pub weight: Weight,
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_text: Option<String>,
    #[serde(default)]
    pub show_letter_on_end: bool,
    pub text: Vec<String>,
    pub video: String,
    pub audio: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_exso_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<u64>,
}

impl Artifact {
    pub fn opacity_ceiling(&self) -> f64 {
        self.weight.opacity_ceiling()
    }

    /// "From {sender}" line, shown only for named artifacts with a sender
    pub fn sender_line(&self) -> Option<String> {
        match (&self.identity, &self.sender_name) {
            (Identity::Named, Some(name)) if !name.trim().is_empty() => {
                Some(format!("From {}", name.trim()))
            }
            _ => None,
        }
    }

    /// Letter shown after the final line, if the sender asked for it
    pub fn closing_letter(&self) -> Option<&str> {
        if !self.show_letter_on_end {
            return None;
        }
        self.letter_text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_exso_id.is_some()
    }
}

#[cfg(test)]
pub(crate) fn sample_artifact(id: &str, weight: Weight, lines: usize) -> Artifact {
    Artifact {
        id: id.to_string(),
        exso_type: ExsoType::ThinkingOfYou,
        weight,
        identity: Identity::Anonymous,
        sender_name: None,
        receiver_name: None,
        letter_text: None,
        show_letter_on_end: false,
        text: (0..lines).map(|i| format!("line {}", i)).collect(),
        video: "/environment/quiet/video.mp4".to_string(),
        audio: "/environment/quiet/audio_1.mp3".to_string(),
        created_at: 1_700_000_000_000,
        reply_to_exso_id: None,
        opened_at: None,
        refunded_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_ceilings() {
        assert_eq!(Weight::Quiet.opacity_ceiling(), 0.85);
        assert_eq!(Weight::Present.opacity_ceiling(), 0.92);
        assert_eq!(Weight::Held.opacity_ceiling(), 1.0);
        assert_eq!(Weight::parse("thunderous").opacity_ceiling(), 1.0);
    }

    #[test]
    fn test_artifact_wire_format() {
        let mut artifact = sample_artifact("abc", Weight::Present, 2);
        artifact.reply_to_exso_id = Some("prev".to_string());

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "thinking_of_you");
        assert_eq!(json["weight"], "present");
        assert_eq!(json["replyToExsoId"], "prev");
        assert_eq!(json["createdAt"], 1_700_000_000_000u64);
        assert!(json.get("senderName").is_none());
    }

    #[test]
    fn test_unknown_weight_deserializes() {
        let raw = r#"{"id":"x","type":"reply_exso","weight":"loud","identity":"named",
            "text":["a"],"video":"v","audio":"a","createdAt":1}"#;
        let artifact: Artifact = serde_json::from_str(raw).unwrap();
        assert_eq!(artifact.weight, Weight::Unrecognized);
        assert_eq!(artifact.opacity_ceiling(), 1.0);
    }

    #[test]
    fn test_sender_line_only_for_named() {
        let mut artifact = sample_artifact("abc", Weight::Held, 1);
        artifact.sender_name = Some("Ana".to_string());
        assert_eq!(artifact.sender_line(), None);

        artifact.identity = Identity::Named;
        assert_eq!(artifact.sender_line().as_deref(), Some("From Ana"));
    }

    #[test]
    fn test_closing_letter_requires_flag() {
        let mut artifact = sample_artifact("abc", Weight::Held, 1);
        artifact.letter_text = Some("Thank you".to_string());
        assert_eq!(artifact.closing_letter(), None);
        artifact.show_letter_on_end = true;
        assert_eq!(artifact.closing_letter(), Some("Thank you"));
    }
}
