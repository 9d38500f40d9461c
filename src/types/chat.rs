use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// Inline media carried as base64, already checked to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPart {
    pub mime_type: String,
    pub data: String,
}

/// One atomic piece of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Media(MediaPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(t),
            Part::Media(_) => None,
        }
    }
}

/// One message of the conversation. `parts` is never empty once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
    HarmCategoryCivicIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
    Off,
}

/// Per-request overrides. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationSettings {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub system_instruction: Option<String>,
    pub safety_thresholds: Option<BTreeMap<HarmCategory, HarmBlockThreshold>>,
}

/// Settings after defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub system_instruction: Option<String>,
    pub safety_thresholds: BTreeMap<HarmCategory, HarmBlockThreshold>,
    pub search_grounding: bool,
}

/// A citation attached by the upstream model when it used search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// One increment of upstream output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: Option<String>,
    pub grounding_sources: Vec<GroundingSource>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            grounding_sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.grounding_sources = sources;
        self
    }
}

/// Output of validation: everything the assembler needs, nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChat {
    pub history: Vec<ConversationTurn>,
    /// `None` when the caller put the new message inside `history`.
    pub prompt: Option<String>,
    pub media: Vec<MediaPart>,
    pub settings: GenerationSettings,
}

/// Turns plus resolved settings, ready for the upstream call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledChat {
    pub contents: Vec<ConversationTurn>,
    pub settings: ResolvedSettings,
}

/// `POST /chat` body as received, before validation.
///
/// Fields are kept loose so the validator can report fixed messages in a
/// fixed order instead of whatever serde trips on first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub history: Option<Value>,
    pub prompt: Option<Value>,
    pub media: Option<Value>,
    /// Single data URI, sent by older frontends instead of `media`.
    pub image: Option<Value>,
    pub temperature: Option<Value>,
    pub max_output_tokens: Option<Value>,
    pub system_instruction: Option<Value>,
    pub safety_thresholds: Option<Value>,
}

/// `POST /generate-image` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRequestBody {
    pub prompt: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponseBody {
    pub image_url: String,
}

/// Image bytes as returned by the provider, still base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: String,
}

impl GeneratedImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
