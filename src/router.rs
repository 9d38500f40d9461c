use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::gemini_client::GeminiClient;
use crate::api::upstream::GenerativeUpstream;
use crate::config::Config;
use crate::error::RelayError;
use crate::handlers::{chat::chat_handler, health::liveness_handler, image::image_handler};
use crate::service::relay::RelaySettings;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    /// `None` when the service started without an API credential.
    pub upstream: Option<Arc<dyn GenerativeUpstream>>,
    pub relay: RelaySettings,
}

impl RelayState {
    pub fn new(config: Config, upstream: Option<Arc<dyn GenerativeUpstream>>) -> Self {
        let relay = RelaySettings::from(&config);
        Self {
            config: Arc::new(config),
            upstream,
            relay,
        }
    }

    /// Build the production state, wiring a Gemini client when a credential
    /// is configured.
    pub fn from_config(config: Config) -> Result<Self, RelayError> {
        let upstream: Option<Arc<dyn GenerativeUpstream>> = match config.gemini.credential() {
            Some(key) => Some(Arc::new(GeminiClient::new(&config.gemini, key)?)),
            None => {
                warn!("GEMINI_API_KEY is not set; generation endpoints will answer 500");
                None
            }
        };
        Ok(Self::new(config, upstream))
    }
}

fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .into_iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    cors.max_age(Duration::from_secs(3600))
}

pub fn relay_router(state: RelayState) -> Router {
    let body_limit = state.config.limits.max_body_bytes;
    let cors = cors_layer(state.config.basic.origins());

    Router::new()
        .route("/", get(liveness_handler))
        .route("/chat", post(chat_handler))
        .route("/generate-image", post(image_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
