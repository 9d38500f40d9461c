use async_trait::async_trait;
use axum::http::StatusCode;
use futures::StreamExt;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::upstream::{ChunkStream, GenerativeUpstream};
use crate::error::RelayError;
use crate::types::chat::{GeneratedImage, StreamChunk};
use crate::types::gemini::GenerateContentRequest;

/// One scripted item of a mocked stream.
#[derive(Debug, Clone)]
pub enum MockStep {
    Chunk(StreamChunk),
    /// Transport failure mid-stream.
    Fail(String),
}

/// Scripted outcome of one `stream_generate` call.
#[derive(Debug, Clone)]
pub enum MockAttempt {
    /// Connection-level failure before any output.
    Unreachable(String),
    /// Provider answered with an error status.
    Status(StatusCode, String),
    /// Yield these steps, then end.
    Stream(Vec<MockStep>),
    /// Yield these steps, then never produce anything again.
    StreamThenHang(Vec<MockStep>),
}

impl MockAttempt {
    /// A stream of plain text chunks.
    pub fn text(chunks: &[&str]) -> Self {
        MockAttempt::Stream(
            chunks
                .iter()
                .map(|t| MockStep::Chunk(StreamChunk::text(*t)))
                .collect(),
        )
    }
}

/// Substitute upstream with scripted attempts and a call counter.
///
/// Attempts are consumed in order; once the script is exhausted the last
/// attempt repeats.
pub struct MockUpstream {
    attempts: Vec<MockAttempt>,
    image: Result<GeneratedImage, (StatusCode, String)>,
    chat_calls: AtomicUsize,
    image_calls: AtomicUsize,
    requests: Arc<Mutex<Vec<GenerateContentRequest>>>,
}

impl MockUpstream {
    pub fn new(attempts: Vec<MockAttempt>) -> Self {
        Self {
            attempts,
            image: Ok(GeneratedImage {
                mime_type: "image/png".to_string(),
                data: "iVBORw0KGgo=".to_string(),
            }),
            chat_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_image_error(mut self, status: StatusCode, message: impl Into<String>) -> Self {
        self.image = Err((status, message.into()));
        self
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<GenerateContentRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new(vec![MockAttempt::text(&["ok"])])
    }
}

fn steps_stream(steps: Vec<MockStep>) -> impl futures::Stream<Item = Result<StreamChunk, RelayError>> {
    stream::iter(steps.into_iter().map(|step| match step {
        MockStep::Chunk(chunk) => Ok(chunk),
        MockStep::Fail(msg) => Err(RelayError::EventStream(msg)),
    }))
}

#[async_trait]
impl GenerativeUpstream for MockUpstream {
    async fn stream_generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream, RelayError> {
        let n = self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let attempt = self
            .attempts
            .get(n)
            .or_else(|| self.attempts.last())
            .cloned()
            .unwrap_or(MockAttempt::Stream(Vec::new()));

        match attempt {
            MockAttempt::Unreachable(msg) => Err(RelayError::EventStream(msg)),
            MockAttempt::Status(status, message) => {
                Err(RelayError::UpstreamStatus { status, message })
            }
            MockAttempt::Stream(steps) => Ok(steps_stream(steps).boxed()),
            MockAttempt::StreamThenHang(steps) => {
                Ok(steps_stream(steps).chain(stream::pending()).boxed())
            }
        }
    }

    async fn generate_image(&self, _prompt: &str) -> Result<GeneratedImage, RelayError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.image
            .clone()
            .map_err(|(status, message)| RelayError::UpstreamStatus { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationDefaults;
    use crate::service::assembler::resolve_settings;
    use crate::types::chat::{AssembledChat, ConversationTurn};

    fn request() -> GenerateContentRequest {
        GenerateContentRequest::from(&AssembledChat {
            contents: vec![ConversationTurn::user_text("hi")],
            settings: resolve_settings(Default::default(), &GenerationDefaults::default(), false),
        })
    }

    #[tokio::test]
    async fn replays_script_then_repeats_last_attempt() {
        let mock = MockUpstream::new(vec![
            MockAttempt::Unreachable("down".into()),
            MockAttempt::text(&["a", "b"]),
        ]);

        assert!(mock.stream_generate(&request()).await.is_err());
        for _ in 0..2 {
            let chunks: Vec<_> = match mock.stream_generate(&request()).await {
                Ok(s) => s.collect().await,
                Err(e) => panic!("unexpected error: {e}"),
            };
            assert_eq!(chunks.len(), 2);
        }
        assert_eq!(mock.chat_calls(), 3);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn image_error_is_scripted() {
        let mock = MockUpstream::default().with_image_error(StatusCode::FORBIDDEN, "no quota");
        let err = mock.generate_image("cat").await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamStatus { status, .. } if status == StatusCode::FORBIDDEN));
        assert_eq!(mock.image_calls(), 1);
    }
}
