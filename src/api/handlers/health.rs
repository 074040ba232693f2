use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::api::state::{AppState, HealthResponse};

pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

/// `GET /v1/health` — 200 when every provider answers its probe, 503 when
/// any is degraded. Results come from the shared 60 s snapshot cache.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let resp = state.health_snapshot().await;
    let code = if resp.status == "degraded" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(resp))
}
