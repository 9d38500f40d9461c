use async_trait::async_trait;
use axum::http::StatusCode;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{StreamExt, stream};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::gemini_api::GeminiApi;
use super::upstream::{ChunkStream, GenerativeUpstream};
use crate::config::GeminiConfig;
use crate::error::RelayError;
use crate::types::chat::{GeneratedImage, StreamChunk};
use crate::types::gemini::{
    GeminiError, GenerateContentRequest, GenerateContentResponse, PredictRequest,
    PredictResponse,
};

/// Production upstream backed by the Gemini REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
    chat_model: String,
    image_model: String,
    image_timeout: Duration,
}

impl GeminiClient {
    pub fn new(cfg: &GeminiConfig, api_key: impl Into<String>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("genai-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()?;
        Ok(Self::new_with_client(cfg, api_key, client))
    }

    pub fn new_with_client(
        cfg: &GeminiConfig,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: cfg.base_url.clone(),
            chat_model: cfg.chat_model.clone(),
            image_model: cfg.image_model.clone(),
            image_timeout: Duration::from_secs(cfg.image_timeout_secs),
        }
    }
}

/// Decode one SSE `data:` payload into the items it yields downstream.
///
/// Keep-alive noise and empty events yield nothing. A candidate stopped by
/// content policy yields whatever text came with it, then the error.
fn decode_event(data: &str) -> Vec<Result<StreamChunk, RelayError>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Vec::new();
    }

    let resp = match parse_event(data) {
        Ok(resp) => resp,
        Err(e) => return vec![Err(e)],
    };
    if let Some(reason) = resp.block_reason() {
        return vec![Err(RelayError::Blocked(reason.to_string()))];
    }

    let stop = resp.content_stop();
    let chunk = resp.into_chunk();
    let mut items = Vec::new();
    if chunk.text.is_some() || !chunk.grounding_sources.is_empty() {
        items.push(Ok(chunk));
    }
    if let Some(reason) = stop {
        items.push(Err(RelayError::Blocked(format!("{reason:?}"))));
    }
    items
}

fn parse_event(data: &str) -> Result<GenerateContentResponse, RelayError> {
    let value: Value = serde_json::from_str(data)?;
    if value.get("error").is_some() {
        let err: GeminiError = serde_json::from_value(value)?;
        let status = u16::try_from(err.error.code)
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(RelayError::UpstreamStatus {
            status,
            message: err.error.message,
        });
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl GenerativeUpstream for GeminiClient {
    async fn stream_generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream, RelayError> {
        let mut url = GeminiApi::model_url(&self.base_url, &self.chat_model, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");
        debug!(model = %self.chat_model, turns = request.contents.len(), "opening Gemini stream");

        let resp = GeminiApi::post(&self.client, url, &self.api_key, None, request).await?;

        let stream = resp
            .bytes_stream()
            .eventsource()
            .flat_map(|event| {
                let items = match event {
                    Ok(event) => decode_event(&event.data),
                    Err(EventStreamError::Transport(e)) => vec![Err(RelayError::Reqwest(e))],
                    Err(e) => vec![Err(RelayError::EventStream(e.to_string()))],
                };
                stream::iter(items)
            })
            .boxed();
        Ok(stream)
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, RelayError> {
        let url = GeminiApi::model_url(&self.base_url, &self.image_model, "predict")?;
        let resp: PredictResponse = GeminiApi::post_json(
            &self.client,
            url,
            &self.api_key,
            Some(self.image_timeout),
            &PredictRequest::single(prompt),
        )
        .await?;

        let (data, mime_type) = resp
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded.map(|d| (d, p.mime_type)))
            .ok_or(RelayError::MissingImage)?;

        Ok(GeneratedImage {
            mime_type: mime_type.unwrap_or_else(|| "image/png".to_string()),
            data,
        })
    }
}
