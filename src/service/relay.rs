use axum::body::{Body, Bytes};
use axum::http::{
    HeaderValue,
    header::{CACHE_CONTROL, CONTENT_TYPE},
};
use axum::response::Response;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::api::upstream::{ChunkStream, GenerativeUpstream};
use crate::config::Config;
use crate::error::RelayError;
use crate::service::framing::{FrameEncoder, Framing, OutputEvent};
use crate::service::retry::RetryPolicy;
use crate::types::chat::{GroundingSource, StreamChunk};
use crate::types::gemini::GenerateContentRequest;

/// Knobs for one relay run.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub retry: RetryPolicy,
    pub framing: Framing,
    pub marker: String,
    /// Longest wait for the stream to open or for the next chunk.
    pub chunk_timeout: Duration,
    /// Upper bound for the whole request, retries included.
    pub deadline: Duration,
}

impl From<&Config> for RelaySettings {
    fn from(cfg: &Config) -> Self {
        Self {
            retry: cfg.retry.to_policy(),
            framing: cfg.relay.framing,
            marker: cfg.relay.marker.clone(),
            chunk_timeout: Duration::from_secs(cfg.relay.chunk_timeout_secs),
            deadline: Duration::from_secs(cfg.relay.deadline_secs),
        }
    }
}

/// How a relay run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    /// An error marker was written, then the stream closed.
    Failed(&'static str),
    /// The client went away; upstream was released early.
    ClientGone,
}

/// Grounding sources in first-seen order, one per URI.
#[derive(Debug, Default)]
struct SourceCollector {
    sources: Vec<GroundingSource>,
}

impl SourceCollector {
    fn extend(&mut self, incoming: Vec<GroundingSource>) {
        for source in incoming {
            if !self.sources.iter().any(|s| s.uri == source.uri) {
                self.sources.push(source);
            }
        }
    }
}

/// Drives the upstream call and forwards output to the client.
#[derive(Clone)]
pub struct ChatRelay {
    upstream: Arc<dyn GenerativeUpstream>,
    settings: RelaySettings,
}

impl ChatRelay {
    pub fn new(upstream: Arc<dyn GenerativeUpstream>, settings: RelaySettings) -> Self {
        Self { upstream, settings }
    }

    /// Send headers right away and relay in a background task.
    pub fn start(&self, request: GenerateContentRequest) -> Response {
        let (tx, rx) = mpsc::channel::<Bytes>(32);
        let relay = self.clone();
        tokio::spawn(async move {
            let outcome = relay.run(request, tx).await;
            debug!(?outcome, "chat relay finished");
        });
        stream_response(rx, self.settings.framing)
    }

    /// Run one request to completion, writing framed output into `tx`.
    pub async fn run(
        &self,
        request: GenerateContentRequest,
        tx: mpsc::Sender<Bytes>,
    ) -> RelayOutcome {
        let settings = &self.settings;
        let deadline = Instant::now() + settings.deadline;
        let mut encoder = FrameEncoder::new(settings.framing, settings.marker.clone());

        let upstream = self.upstream.as_ref();
        let request = &request;
        let chunk_timeout = settings.chunk_timeout;
        let open = move || async move {
            let mut stream = timeout(chunk_timeout, upstream.stream_generate(request))
                .await
                .map_err(|_| RelayError::Timeout(chunk_timeout))??;
            // Nothing reaches the client until a chunk carries text, so
            // empty or sources-only chunks keep the attempt retryable.
            let mut sources = Vec::new();
            loop {
                let next = timeout(chunk_timeout, stream.next())
                    .await
                    .map_err(|_| RelayError::Timeout(chunk_timeout))?;
                match next {
                    Some(Ok(chunk)) => {
                        sources.extend(chunk.grounding_sources);
                        if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                            let first = StreamChunk::text(text).with_sources(sources);
                            return Ok::<_, RelayError>((Some(first), stream));
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        let first = (!sources.is_empty())
                            .then(|| StreamChunk::default().with_sources(sources));
                        return Ok((first, stream));
                    }
                }
            }
        };

        let opened = tokio::select! {
            _ = tx.closed() => {
                info!("client disconnected before upstream responded");
                return RelayOutcome::ClientGone;
            }
            res = tokio::time::timeout_at(
                deadline,
                settings.retry.run("Gemini stream", open, RelayError::is_retryable),
            ) => res.unwrap_or(Err(RelayError::Timeout(settings.deadline))),
        };

        let (first, stream) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!(error = %e, "upstream call failed, giving up");
                return fail(&tx, &mut encoder, &e).await;
            }
        };

        self.forward(first, stream, deadline, &tx, &mut encoder).await
    }

    async fn forward(
        &self,
        first: Option<StreamChunk>,
        mut stream: ChunkStream,
        deadline: Instant,
        tx: &mpsc::Sender<Bytes>,
        encoder: &mut FrameEncoder,
    ) -> RelayOutcome {
        let mut sources = SourceCollector::default();
        let mut pending = first;
        let mut forwarded = 0usize;

        loop {
            if let Some(chunk) = pending.take() {
                sources.extend(chunk.grounding_sources);
                if let Some(text) = chunk.text {
                    forwarded += text.len();
                    if tx.send(encoder.encode(&OutputEvent::Text(text))).await.is_err() {
                        info!(forwarded, "client disconnected mid-stream, releasing upstream");
                        return RelayOutcome::ClientGone;
                    }
                }
            }

            let wait = self
                .settings
                .chunk_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let next = tokio::select! {
                _ = tx.closed() => {
                    info!(forwarded, "client disconnected mid-stream, releasing upstream");
                    return RelayOutcome::ClientGone;
                }
                next = timeout(wait, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(chunk))) => pending = Some(chunk),
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    error!(error = %e, forwarded, "upstream failed after output began");
                    return fail(tx, encoder, &e).await;
                }
                Err(_) => {
                    let e = RelayError::Timeout(wait);
                    error!(error = %e, forwarded, "upstream stalled after output began");
                    return fail(tx, encoder, &e).await;
                }
            }
        }

        if forwarded == 0 {
            warn!("upstream finished without any text");
        }
        if !sources.sources.is_empty() {
            let event = OutputEvent::Sources(sources.sources);
            if tx.send(encoder.encode(&event)).await.is_err() {
                return RelayOutcome::ClientGone;
            }
        }
        info!(forwarded, "chat stream completed");
        RelayOutcome::Completed
    }
}

async fn fail(
    tx: &mpsc::Sender<Bytes>,
    encoder: &mut FrameEncoder,
    err: &RelayError,
) -> RelayOutcome {
    let event = OutputEvent::Error {
        message: err.client_message(),
        code: err.code(),
    };
    if tx.send(encoder.encode(&event)).await.is_err() {
        return RelayOutcome::ClientGone;
    }
    RelayOutcome::Failed(err.code())
}

/// Incremental, uncacheable body fed from `rx`.
pub fn stream_response(rx: mpsc::Receiver<Bytes>, framing: Framing) -> Response {
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(framing.content_type()));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
