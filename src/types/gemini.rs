use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::{
    AssembledChat, ConversationTurn, GroundingSource, HarmBlockThreshold, HarmCategory,
    MediaPart, Part, StreamChunk,
};

/// `generateContent` / `streamGenerateContent` request payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

/// Untagged union of the part shapes the provider emits.
///
/// Variant order matters for decoding; unknown shapes land in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WirePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: MediaPart,
    },
    Other(Value),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub google_search: GoogleSearch,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GoogleSearch {}

impl From<&ConversationTurn> for Content {
    fn from(turn: &ConversationTurn) -> Self {
        Content {
            role: Some(turn.role.as_str().to_string()),
            parts: turn
                .parts
                .iter()
                .map(|p| match p {
                    Part::Text(text) => WirePart::Text { text: text.clone() },
                    Part::Media(media) => WirePart::InlineData {
                        inline_data: media.clone(),
                    },
                })
                .collect(),
        }
    }
}

impl From<&AssembledChat> for GenerateContentRequest {
    fn from(chat: &AssembledChat) -> Self {
        let settings = &chat.settings;
        GenerateContentRequest {
            contents: chat.contents.iter().map(Content::from).collect(),
            system_instruction: settings.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![WirePart::Text { text: text.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            },
            safety_settings: settings
                .safety_thresholds
                .iter()
                .map(|(category, threshold)| SafetySetting {
                    category: *category,
                    threshold: *threshold,
                })
                .collect(),
            tools: if settings.search_grounding {
                vec![Tool {
                    google_search: GoogleSearch::default(),
                }]
            } else {
                Vec::new()
            },
        }
    }
}

/// Finish reasons returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum FinishReason {
    FINISH_REASON_UNSPECIFIED,
    STOP,
    MAX_TOKENS,
    SAFETY,
    RECITATION,
    LANGUAGE,
    OTHER,
    BLOCKLIST,
    PROHIBITED_CONTENT,
    SPII,
    MALFORMED_FUNCTION_CALL,
    IMAGE_SAFETY,
    #[serde(other)]
    UNKNOWN,
}

impl FinishReason {
    /// The candidate was cut off by a content policy rather than finishing.
    pub fn is_content_stop(&self) -> bool {
        matches!(
            self,
            FinishReason::SAFETY
                | FinishReason::RECITATION
                | FinishReason::BLOCKLIST
                | FinishReason::PROHIBITED_CONTENT
                | FinishReason::SPII
                | FinishReason::IMAGE_SAFETY
        )
    }
}

/// One event of a `streamGenerateContent?alt=sse` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSource {
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl GenerateContentResponse {
    /// Reason the provider refused the prompt, if it did.
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }

    /// Finish reason of a first candidate stopped by content policy.
    pub fn content_stop(&self) -> Option<FinishReason> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
            .filter(FinishReason::is_content_stop)
    }

    /// Collapse the first candidate into the relay's chunk shape.
    pub fn into_chunk(self) -> StreamChunk {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return StreamChunk::default();
        };

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| match p {
                WirePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        let grounding_sources = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .map(|web| GroundingSource {
                title: web.title.unwrap_or_else(|| web.uri.clone()),
                uri: web.uri,
            })
            .collect();

        StreamChunk {
            text: (!text.is_empty()).then_some(text),
            grounding_sources,
        }
    }
}

/// Imagen `:predict` request payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictRequest {
    pub instances: Vec<PredictInstance>,
    pub parameters: PredictParameters,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictParameters {
    pub sample_count: u32,
}

impl PredictRequest {
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            instances: vec![PredictInstance {
                prompt: prompt.into(),
            }],
            parameters: PredictParameters { sample_count: 1 },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Provider error response structure.
#[derive(Deserialize, Debug, Clone)]
pub struct GeminiError {
    pub error: GeminiErrorBody,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeminiErrorBody {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

impl GeminiError {
    /// Best-effort parse of an error body; falls back to the raw text.
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<GeminiError>(body) {
            Ok(err) if !err.error.message.is_empty() => err.error.message,
            _ => body.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chat::{ResolvedSettings, Role};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn request_serializes_provider_field_names() {
        let chat = AssembledChat {
            contents: vec![ConversationTurn {
                role: Role::User,
                parts: vec![
                    Part::text("what is this"),
                    Part::Media(MediaPart {
                        mime_type: "image/png".to_string(),
                        data: "iVBORw0K".to_string(),
                    }),
                ],
            }],
            settings: ResolvedSettings {
                temperature: 0.5,
                max_output_tokens: 256,
                system_instruction: Some("be brief".to_string()),
                safety_thresholds: BTreeMap::from([(
                    HarmCategory::HarmCategoryHarassment,
                    HarmBlockThreshold::BlockNone,
                )]),
                search_grounding: true,
            },
        };

        let value = serde_json::to_value(GenerateContentRequest::from(&chat)).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "what is this" },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0K" } }
                    ]
                }],
                "systemInstruction": { "parts": [{ "text": "be brief" }] },
                "generationConfig": { "temperature": 0.5, "maxOutputTokens": 256 },
                "safetySettings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE" }
                ],
                "tools": [{ "googleSearch": {} }]
            })
        );
    }

    #[test]
    fn chunk_joins_text_parts_and_collects_web_sources() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hel" }, { "text": "lo" }] },
                "finishReason": "STOP",
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://x", "title": "X" } },
                        { "retrievedContext": { "uri": "ignored" } },
                        { "web": { "uri": "https://y" } }
                    ]
                }
            }]
        }))
        .unwrap();

        let chunk = resp.into_chunk();
        assert_eq!(chunk.text.as_deref(), Some("Hello"));
        assert_eq!(
            chunk.grounding_sources,
            vec![
                GroundingSource {
                    uri: "https://x".to_string(),
                    title: "X".to_string()
                },
                GroundingSource {
                    uri: "https://y".to_string(),
                    title: "https://y".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_candidates_yield_empty_chunk() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert_eq!(resp.block_reason(), Some("SAFETY"));
        assert_eq!(resp.into_chunk(), StreamChunk::default());
    }

    #[test]
    fn policy_finish_reasons_are_content_stops() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "PROHIBITED_CONTENT" }]
        }))
        .unwrap();
        assert_eq!(resp.content_stop(), Some(FinishReason::PROHIBITED_CONTENT));

        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "done" }] }, "finishReason": "MAX_TOKENS" }]
        }))
        .unwrap();
        assert_eq!(resp.content_stop(), None);
    }

    #[test]
    fn unknown_finish_reason_does_not_fail_parsing() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }] }, "finishReason": "BRAND_NEW" }]
        }))
        .unwrap();
        assert_eq!(resp.candidates[0].finish_reason, Some(FinishReason::UNKNOWN));
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(GeminiError::message_from_body(body), "API key not valid");
        assert_eq!(GeminiError::message_from_body(" upstream down "), "upstream down");
    }
}
