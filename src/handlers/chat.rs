use axum::{extract::State, response::Response};
use tracing::info;

use crate::middleware::chat_request::ChatPreprocess;
use crate::middleware::upstream::RequireUpstream;
use crate::router::RelayState;
use crate::service::assembler::assemble;
use crate::service::relay::ChatRelay;
use crate::types::gemini::GenerateContentRequest;

/// `POST /chat`: validate, assemble, then stream the reply.
///
/// Everything that can be rejected is rejected by the extractors, so once
/// this body runs the response is always a stream.
pub async fn chat_handler(
    State(state): State<RelayState>,
    RequireUpstream(upstream): RequireUpstream,
    ChatPreprocess(chat): ChatPreprocess,
) -> Response {
    let cfg = &state.config;
    let assembled = assemble(chat, &cfg.defaults, cfg.gemini.enable_search_grounding);
    info!(
        turns = assembled.contents.len(),
        temperature = assembled.settings.temperature,
        search = assembled.settings.search_grounding,
        "chat request accepted"
    );

    let request = GenerateContentRequest::from(&assembled);
    ChatRelay::new(upstream, state.relay.clone()).start(request)
}
