use base64::Engine;
use serde_json::Value;

use crate::types::chat::MediaPart;

/// Split a `data:<mime>;base64,<payload>` URI into a checked media part.
pub fn parse_data_uri(uri: &str) -> Result<MediaPart, String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "expected a data: URI".to_string())?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no payload".to_string())?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| "data URI must be base64 encoded".to_string())?;
    inline_media(mime, payload)
}

/// Check a mime type and base64 payload pair.
pub fn inline_media(mime_type: &str, data: &str) -> Result<MediaPart, String> {
    if !is_mime_type(mime_type) {
        return Err(format!("invalid mime type `{mime_type}`"));
    }
    if data.is_empty() {
        return Err("media payload is empty".to_string());
    }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| format!("payload is not valid base64: {e}"))?;
    Ok(MediaPart {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

/// Accepts a data URI string, `{mimeType, data}` or `{inlineData: {mimeType, data}}`.
pub fn media_from_value(value: &Value) -> Result<MediaPart, String> {
    match value {
        Value::String(uri) => parse_data_uri(uri),
        Value::Object(map) => {
            let inner = match map.get("inlineData") {
                Some(Value::Object(inner)) => inner,
                Some(_) => return Err("inlineData must be an object".to_string()),
                None => map,
            };
            let mime = inner
                .get("mimeType")
                .and_then(Value::as_str)
                .ok_or_else(|| "missing mimeType".to_string())?;
            let data = inner
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| "missing data".to_string())?;
            inline_media(mime, data)
        }
        _ => Err("expected a data URI or a {mimeType, data} object".to_string()),
    }
}

fn is_mime_type(mime: &str) -> bool {
    let Some((kind, subtype)) = mime.split_once('/') else {
        return false;
    };
    let token = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&^_.+-".contains(c))
    };
    token(kind) && token(subtype)
}
