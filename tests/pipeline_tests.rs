use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use genai_relay::api::{GenerativeUpstream, MockUpstream};
use genai_relay::config::{Config, GenerationDefaults, LimitsConfig};
use genai_relay::service::assembler::assemble;
use genai_relay::service::validator::validate_chat;
use genai_relay::types::chat::ChatRequestBody;
use genai_relay::{RelayState, relay_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn small_limits() -> LimitsConfig {
    LimitsConfig {
        max_history_length: 4,
        max_prompt_length: 16,
        ..LimitsConfig::default()
    }
}

fn turns(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "model" };
            json!({ "role": role, "parts": [{ "text": format!("turn {i}") }] })
        })
        .collect()
}

async fn send_chat(body: Value) -> (StatusCode, Value, usize) {
    let mut cfg = Config::default();
    cfg.limits = small_limits();
    let mock = Arc::new(MockUpstream::default());
    let upstream: Arc<dyn GenerativeUpstream> = mock.clone();
    let app = relay_router(RelayState::new(cfg, Some(upstream)));

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, mock.chat_calls())
}

#[tokio::test]
async fn every_violated_bound_is_rejected_without_calling_upstream() {
    let cases = [
        (json!({ "history": turns(5), "prompt": "hi" }), "HISTORY_TOO_LONG"),
        (
            json!({ "history": turns(2), "prompt": "x".repeat(17) }),
            "PROMPT_TOO_LONG",
        ),
        (json!({ "history": [], "prompt": "" }), "EMPTY_PROMPT"),
        (json!({ "history": [] }), "MISSING_USER_TURN"),
        (
            json!({ "history": [], "prompt": "look", "media": ["data:;base64,AAAA"] }),
            "MALFORMED_MEDIA",
        ),
        (
            json!({ "history": [], "prompt": "look", "media": ["data:image/png;base64,@@@"] }),
            "MALFORMED_MEDIA",
        ),
    ];

    for (body, code) in cases {
        let (status, json, calls) = send_chat(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "expected {code}");
        assert_eq!(json["code"], code);
        assert_eq!(calls, 0, "upstream must not be called for {code}");
    }
}

#[tokio::test]
async fn requests_at_the_bounds_reach_upstream() {
    let body = json!({ "history": turns(4), "prompt": "x".repeat(16) });
    let (status, _, calls) = send_chat(body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls, 1);
}

#[test]
fn validate_and_assemble_is_deterministic() {
    let raw = json!({
        "history": turns(2),
        "prompt": "describe this",
        "media": ["data:image/png;base64,iVBORw0KGgo="],
        "temperature": 0.4
    });

    let run = || {
        let body: ChatRequestBody = serde_json::from_value(raw.clone()).unwrap();
        let validated = validate_chat(body, &small_limits()).unwrap();
        assemble(validated, &GenerationDefaults::default(), true)
    };

    let first = run();
    for _ in 0..5 {
        assert_eq!(run(), first);
    }
    assert_eq!(first.contents.len(), 3);
    assert_eq!(first.contents[2].parts.len(), 2);
}
