use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::chat::GroundingSource;

/// Wire format of the chat response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Raw text; terminal metadata on its own line behind a reserved marker.
    Marker,
    /// One tagged JSON object per line.
    Ndjson,
}

impl Framing {
    pub fn content_type(&self) -> &'static str {
        match self {
            Framing::Marker => "text/plain; charset=utf-8",
            Framing::Ndjson => "application/x-ndjson",
        }
    }
}

/// What the relay hands to the client, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Text(String),
    Sources(Vec<GroundingSource>),
    Error { message: String, code: &'static str },
}

/// Turns events into body bytes. Tracks line position so marker lines
/// always start at column zero.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    framing: Framing,
    marker: String,
    at_line_start: bool,
}

impl FrameEncoder {
    pub fn new(framing: Framing, marker: impl Into<String>) -> Self {
        Self {
            framing,
            marker: marker.into(),
            at_line_start: true,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn encode(&mut self, event: &OutputEvent) -> Bytes {
        match self.framing {
            Framing::Marker => self.encode_marker(event),
            Framing::Ndjson => Self::encode_ndjson(event),
        }
    }

    fn encode_marker(&mut self, event: &OutputEvent) -> Bytes {
        let payload = match event {
            OutputEvent::Text(text) => {
                if !text.is_empty() {
                    self.at_line_start = text.ends_with('\n');
                }
                return Bytes::from(text.clone());
            }
            OutputEvent::Sources(sources) => json!({ "sources": sources }),
            OutputEvent::Error { message, code } => json!({ "error": message, "code": code }),
        };

        let mut line = String::new();
        if !self.at_line_start {
            line.push('\n');
        }
        line.push_str(&self.marker);
        line.push_str(&payload.to_string());
        line.push('\n');
        self.at_line_start = true;
        Bytes::from(line)
    }

    fn encode_ndjson(event: &OutputEvent) -> Bytes {
        let value = match event {
            OutputEvent::Text(text) => json!({ "type": "text", "payload": text }),
            OutputEvent::Sources(sources) => json!({ "type": "sources", "payload": sources }),
            OutputEvent::Error { message, code } => json!({
                "type": "error",
                "payload": { "message": message, "code": code }
            }),
        };
        let mut line = value.to_string();
        line.push('\n');
        Bytes::from(line)
    }
}
