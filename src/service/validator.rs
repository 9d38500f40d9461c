use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::LimitsConfig;
use crate::error::ValidationError;
use crate::service::media;
use crate::types::chat::{
    ChatRequestBody, ConversationTurn, GenerationSettings, HarmBlockThreshold, HarmCategory,
    ImageRequestBody, MediaPart, Part, Role, ValidatedChat,
};

/// Check a chat request body and normalize it.
///
/// Checks run in a fixed order and stop at the first violation: history
/// shape, prompt type, history length, prompt length, media, turn contents,
/// then generation settings.
pub fn validate_chat(
    body: ChatRequestBody,
    limits: &LimitsConfig,
) -> Result<ValidatedChat, ValidationError> {
    let Some(Value::Array(raw_history)) = body.history else {
        return Err(ValidationError::MissingHistory);
    };

    let prompt = match body.prompt {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(ValidationError::PromptNotString),
    };

    if raw_history.len() > limits.max_history_length {
        return Err(ValidationError::HistoryTooLong {
            max: limits.max_history_length,
        });
    }

    if let Some(p) = &prompt
        && p.chars().count() > limits.max_prompt_length
    {
        return Err(ValidationError::PromptTooLong {
            max: limits.max_prompt_length,
        });
    }

    let media = collect_media(body.media, body.image, limits.max_media_parts)?;

    let history = raw_history
        .iter()
        .enumerate()
        .map(|(index, value)| parse_turn(index, value))
        .collect::<Result<Vec<_>, _>>()?;

    match &prompt {
        Some(p) if p.trim().is_empty() && media.is_empty() => {
            return Err(ValidationError::EmptyPrompt);
        }
        None if history.last().map(|t| t.role) != Some(Role::User) => {
            return Err(ValidationError::MissingUserTurn);
        }
        _ => {}
    }

    let settings = GenerationSettings {
        temperature: parse_temperature(body.temperature)?,
        max_output_tokens: parse_max_output_tokens(body.max_output_tokens)?,
        system_instruction: parse_system_instruction(body.system_instruction)?,
        safety_thresholds: parse_safety_thresholds(body.safety_thresholds)?,
    };

    Ok(ValidatedChat {
        history,
        prompt,
        media,
        settings,
    })
}

/// Check an image request body, returning the prompt.
pub fn validate_image(
    body: ImageRequestBody,
    limits: &LimitsConfig,
) -> Result<String, ValidationError> {
    let prompt = match body.prompt {
        Some(Value::String(s)) => s,
        _ => return Err(ValidationError::PromptNotString),
    };
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    if prompt.chars().count() > limits.max_prompt_length {
        return Err(ValidationError::PromptTooLong {
            max: limits.max_prompt_length,
        });
    }
    Ok(prompt)
}

fn collect_media(
    media: Option<Value>,
    image: Option<Value>,
    max: usize,
) -> Result<Vec<MediaPart>, ValidationError> {
    let mut raw: Vec<Value> = match media {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    match image {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.is_empty() => {}
        Some(other) => raw.push(other),
    }

    if raw.len() > max {
        return Err(ValidationError::TooManyMedia { max });
    }

    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            media::media_from_value(value)
                .map_err(|reason| ValidationError::MalformedMedia { index, reason })
        })
        .collect()
}

fn parse_turn(index: usize, value: &Value) -> Result<ConversationTurn, ValidationError> {
    let malformed = |reason: &str| ValidationError::MalformedTurn {
        index,
        reason: reason.to_string(),
    };

    let obj = value
        .as_object()
        .ok_or_else(|| malformed("expected an object"))?;

    let role = match obj.get("role").and_then(Value::as_str) {
        Some("user") => Role::User,
        Some("model") => Role::Model,
        Some(other) => return Err(malformed(&format!("unknown role `{other}`"))),
        None => return Err(malformed("missing role")),
    };

    let raw_parts = obj
        .get("parts")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("parts must be an array"))?;
    if raw_parts.is_empty() {
        return Err(ValidationError::EmptyTurn { index });
    }

    let parts = raw_parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text") {
                if ["inlineData", "mimeType", "data"]
                    .iter()
                    .any(|key| part.get(key).is_some())
                {
                    return Err(malformed("part must carry either text or media, not both"));
                }
                return text
                    .as_str()
                    .map(Part::text)
                    .ok_or_else(|| malformed("text part must be a string"));
            }
            media::media_from_value(part)
                .map(Part::Media)
                .map_err(|reason| malformed(&reason))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConversationTurn { role, parts })
}

fn parse_temperature(value: Option<Value>) -> Result<Option<f32>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|t| (0.0..=2.0).contains(t))
            .map(|t| Some(t as f32))
            .ok_or(ValidationError::InvalidTemperature),
    }
}

fn parse_max_output_tokens(value: Option<Value>) -> Result<Option<u32>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or(ValidationError::InvalidMaxOutputTokens),
    }
}

fn parse_system_instruction(value: Option<Value>) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ValidationError::InvalidSystemInstruction),
    }
}

fn parse_safety_thresholds(
    value: Option<Value>,
) -> Result<Option<BTreeMap<HarmCategory, HarmBlockThreshold>>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| ValidationError::InvalidSafetyThresholds(e.to_string())),
    }
}
