use axum::Json;
use serde_json::{Value, json};

pub async fn liveness_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "genai-relay" }))
}
