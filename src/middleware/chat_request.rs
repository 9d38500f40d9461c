use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use serde::de::DeserializeOwned;

use crate::error::{RelayError, ValidationError};
use crate::router::RelayState;
use crate::service::validator::{validate_chat, validate_image};
use crate::types::chat::{ChatRequestBody, ImageRequestBody, ValidatedChat};

/// Parse the JSON body, mapping axum's rejections onto our error shape.
async fn read_json<T>(req: Request, state: &RelayState) -> Result<T, RelayError>
where
    T: DeserializeOwned,
{
    match Json::<T>::from_request(req, state).await {
        Ok(Json(body)) => Ok(body),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(RelayError::PayloadTooLarge)
        }
        Err(rejection) => Err(ValidationError::InvalidJson(rejection.body_text()).into()),
    }
}

/// Validated `POST /chat` request. Rejects before any streaming starts.
pub struct ChatPreprocess(pub ValidatedChat);

impl FromRequest<RelayState> for ChatPreprocess {
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &RelayState) -> Result<Self, Self::Rejection> {
        let body: ChatRequestBody = read_json(req, state).await?;
        let validated = validate_chat(body, &state.config.limits)?;
        Ok(ChatPreprocess(validated))
    }
}

/// Validated `POST /generate-image` prompt.
pub struct ImagePreprocess(pub String);

impl FromRequest<RelayState> for ImagePreprocess {
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &RelayState) -> Result<Self, Self::Rejection> {
        let body: ImageRequestBody = read_json(req, state).await?;
        let prompt = validate_image(body, &state.config.limits)?;
        Ok(ImagePreprocess(prompt))
    }
}
