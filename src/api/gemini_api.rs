use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::error;
use url::Url;

use crate::error::RelayError;
use crate::types::gemini::GeminiError;

/// Stateless calls against the provider's REST surface.
pub struct GeminiApi;

impl GeminiApi {
    /// POST `body` and hand back the response once its status is a success.
    pub async fn post<T>(
        client: &reqwest::Client,
        url: Url,
        api_key: &str,
        timeout: Option<Duration>,
        body: &T,
    ) -> Result<reqwest::Response, RelayError>
    where
        T: Serialize,
    {
        let mut req = client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await.inspect_err(|e| {
            error!("Failed to send request to Gemini: {}", e);
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("Gemini API error (status {}): {}", status, text);
            return Err(RelayError::UpstreamStatus {
                status,
                message: GeminiError::message_from_body(&text),
            });
        }
        Ok(resp)
    }

    /// POST `body` and decode a JSON response.
    pub async fn post_json<T, R>(
        client: &reqwest::Client,
        url: Url,
        api_key: &str,
        timeout: Option<Duration>,
        body: &T,
    ) -> Result<R, RelayError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let resp = Self::post(client, url, api_key, timeout, body).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Gemini response: {}\nBody: {}", e, text);
            RelayError::Json(e)
        })
    }

    /// `{base}/v1beta/models/{model}:{rpc}`
    pub fn model_url(base: &Url, model: &str, rpc: &str) -> Result<Url, RelayError> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let raw = format!(
            "{}/v1beta/models/{}:{}",
            base.as_str().trim_end_matches('/'),
            model,
            rpc
        );
        Ok(Url::parse(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_url_strips_models_prefix_and_trailing_slash() {
        let base = Url::parse("https://example.test/").unwrap();
        let url = GeminiApi::model_url(&base, "models/gemini-2.5-flash", "generateContent")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
