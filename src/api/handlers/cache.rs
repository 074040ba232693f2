use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct CacheDeleteResponse {
    pub status: &'static str,
    pub stack: String,
}

/// `DELETE /v1/cache/{stack}` — purge cached values for a stack and drop it
/// from the index.
pub async fn delete_stack_cache(
    State(state): State<Arc<AppState>>,
    Path(stack): Path<String>,
) -> Json<CacheDeleteResponse> {
    if let Some(store) = &state.cache {
        if !stack.is_empty() {
            if let Err(e) = store.delete_prefix(&format!("{stack}/")) {
                warn!(stack = %stack, error = %e, "cache delete: prefix purge failed");
            }
        }
    }
    state.index.delete(&stack);
    info!(stack = %stack, "cache delete: complete");
    Json(CacheDeleteResponse { status: "ok", stack })
}
