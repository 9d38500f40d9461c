use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RelayError;
use crate::types::chat::{GeneratedImage, StreamChunk};
use crate::types::gemini::GenerateContentRequest;

/// Incremental upstream output. Ends when the model is done.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, RelayError>>;

/// The hosted generative API, as seen by the relay and the image handler.
///
/// Constructed once at startup and shared read-only; tests substitute
/// [`MockUpstream`](crate::api::mock::MockUpstream).
#[async_trait]
pub trait GenerativeUpstream: Send + Sync {
    /// Start a streamed chat generation. An `Err` here means nothing was
    /// produced yet.
    async fn stream_generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream, RelayError>;

    /// Generate one image from a text prompt.
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, RelayError>;
}
