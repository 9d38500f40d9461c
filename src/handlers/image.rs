use axum::{Json, extract::State};
use tracing::info;

use crate::error::RelayError;
use crate::middleware::chat_request::ImagePreprocess;
use crate::middleware::upstream::RequireUpstream;
use crate::router::RelayState;
use crate::types::chat::ImageResponseBody;

/// `POST /generate-image`: one prompt in, one data URL out.
///
/// Only transport failures are retried; provider errors go straight back.
pub async fn image_handler(
    State(state): State<RelayState>,
    RequireUpstream(upstream): RequireUpstream,
    ImagePreprocess(prompt): ImagePreprocess,
) -> Result<Json<ImageResponseBody>, RelayError> {
    let image = state
        .relay
        .retry
        .run(
            "Gemini image generation",
            || upstream.generate_image(&prompt),
            RelayError::is_transport,
        )
        .await?;

    info!(mime = %image.mime_type, "image generated");
    Ok(Json(ImageResponseBody {
        image_url: image.to_data_url(),
    }))
}
