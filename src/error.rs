use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Rejections produced before any upstream call. The caller can fix these.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("history must be an array of conversation turns")]
    MissingHistory,

    #[error("prompt must be a string")]
    PromptNotString,

    #[error("history exceeds the maximum of {max} turns")]
    HistoryTooLong { max: usize },

    #[error("prompt exceeds the maximum of {max} characters")]
    PromptTooLong { max: usize },

    #[error("history turn {index} is malformed: {reason}")]
    MalformedTurn { index: usize, reason: String },

    #[error("history turn {index} has no parts")]
    EmptyTurn { index: usize },

    #[error("too many media attachments (maximum {max})")]
    TooManyMedia { max: usize },

    #[error("media attachment {index} is malformed: {reason}")]
    MalformedMedia { index: usize, reason: String },

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("history must end with a user turn when no prompt is given")]
    MissingUserTurn,

    #[error("temperature must be a number between 0 and 2")]
    InvalidTemperature,

    #[error("maxOutputTokens must be a positive integer")]
    InvalidMaxOutputTokens,

    #[error("systemInstruction must be a string")]
    InvalidSystemInstruction,

    #[error("safetyThresholds is malformed: {0}")]
    InvalidSafetyThresholds(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidJson(_) => "INVALID_JSON",
            ValidationError::MissingHistory => "MISSING_HISTORY",
            ValidationError::PromptNotString => "INVALID_PROMPT",
            ValidationError::HistoryTooLong { .. } => "HISTORY_TOO_LONG",
            ValidationError::PromptTooLong { .. } => "PROMPT_TOO_LONG",
            ValidationError::MalformedTurn { .. } | ValidationError::EmptyTurn { .. } => {
                "MALFORMED_HISTORY"
            }
            ValidationError::TooManyMedia { .. } => "TOO_MANY_MEDIA",
            ValidationError::MalformedMedia { .. } => "MALFORMED_MEDIA",
            ValidationError::EmptyPrompt => "EMPTY_PROMPT",
            ValidationError::MissingUserTurn => "MISSING_USER_TURN",
            ValidationError::InvalidTemperature
            | ValidationError::InvalidMaxOutputTokens
            | ValidationError::InvalidSystemInstruction
            | ValidationError::InvalidSafetyThresholds(_) => "INVALID_SETTINGS",
        }
    }
}

#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("upstream API credential is not configured")]
    MissingCredential,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upstream event stream error: {0}")]
    EventStream(String),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Gemini API error (status {status}): {message}")]
    UpstreamStatus { status: StatusCode, message: String },

    #[error("upstream blocked the request: {0}")]
    Blocked(String),

    #[error("upstream returned no image")]
    MissingImage,
}

impl RelayError {
    /// Failures worth another attempt: transport trouble, timeouts, and
    /// provider overload (429/5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::UpstreamStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => self.is_transport(),
        }
    }

    /// Network-level failures, as opposed to an answer from the provider.
    pub fn is_transport(&self) -> bool {
        match self {
            RelayError::Reqwest(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            RelayError::EventStream(_) | RelayError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::UpstreamStatus { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RelayError::UrlParse(_)
            | RelayError::Reqwest(_)
            | RelayError::Json(_)
            | RelayError::EventStream(_)
            | RelayError::UpstreamStatus { .. }
            | RelayError::Blocked(_)
            | RelayError::MissingImage => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(v) => v.code(),
            RelayError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            RelayError::MissingCredential => "CONFIGURATION_ERROR",
            RelayError::Timeout(_) => "UPSTREAM_TIMEOUT",
            RelayError::Reqwest(_) | RelayError::EventStream(_) => "UPSTREAM_UNAVAILABLE",
            RelayError::UrlParse(_) | RelayError::Json(_) => "UPSTREAM_PROTOCOL",
            RelayError::UpstreamStatus { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                "UPSTREAM_RATE_LIMITED"
            }
            RelayError::UpstreamStatus { .. } => "UPSTREAM_ERROR",
            RelayError::Blocked(_) => "UPSTREAM_BLOCKED",
            RelayError::MissingImage => "UPSTREAM_EMPTY",
        }
    }

    /// Message shown to the caller. Full detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Validation(v) => format!("Invalid request: {v}"),
            RelayError::PayloadTooLarge => "Invalid request: request body too large".to_string(),
            RelayError::MissingCredential => {
                "Server is not configured: the upstream API credential is missing.".to_string()
            }
            RelayError::Timeout(_) => {
                "The AI service took too long to respond. Please try again.".to_string()
            }
            RelayError::Reqwest(_) | RelayError::EventStream(_) => {
                "The AI service could not be reached. Please try again later.".to_string()
            }
            RelayError::UrlParse(_) | RelayError::Json(_) => {
                "The AI service returned an unreadable response.".to_string()
            }
            RelayError::UpstreamStatus { message, .. } => {
                format!("The AI service returned an error: {message}")
            }
            RelayError::Blocked(reason) => {
                format!("The AI service declined to answer (reason: {reason}).")
            }
            RelayError::MissingImage => "The AI service returned no image.".to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            RelayError::Validation(_) | RelayError::PayloadTooLarge => {
                tracing::debug!(error = %self, "rejecting request");
            }
            _ => tracing::error!(error = %self, "request failed"),
        }
        let body = ApiErrorResponse {
            error: self.client_message(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Standardized API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn validation_errors_are_never_retried() {
        let err = RelayError::from(ValidationError::EmptyPrompt);
        assert!(!err.is_retryable());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "EMPTY_PROMPT");
    }

    #[test]
    fn provider_overload_is_retryable_but_client_errors_are_not() {
        let overloaded = RelayError::UpstreamStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "overloaded".to_string(),
        };
        let bad_key = RelayError::UpstreamStatus {
            status: StatusCode::BAD_REQUEST,
            message: "API key not valid".to_string(),
        };
        assert!(overloaded.is_retryable());
        assert!(!overloaded.is_transport());
        assert!(!bad_key.is_retryable());
        assert!(RelayError::Timeout(Duration::from_secs(1)).is_transport());
    }

    #[tokio::test]
    async fn missing_credential_renders_fixed_500() {
        let resp = RelayError::MissingCredential.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "CONFIGURATION_ERROR");
        assert!(value["error"].as_str().unwrap().contains("not configured"));
    }

    #[test]
    fn upstream_message_is_embedded_for_the_caller() {
        let err = RelayError::UpstreamStatus {
            status: StatusCode::BAD_REQUEST,
            message: "Imagen is only available on paid plans".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.client_message().contains("Imagen is only available"));
    }
}
