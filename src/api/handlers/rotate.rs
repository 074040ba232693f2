use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::state::AppState;
use crate::audit;

#[derive(Debug, Serialize)]
pub struct RotateResponse {
    pub item_id: String,
    pub cache_invalidated: usize,
    pub stacks_redeployed: Vec<String>,
}

/// `POST /v1/rotate/{item_id}` — drop every cached value belonging to the
/// rotated item, then redeploy the stacks that reference it so they pick up
/// the new value.
pub async fn rotate_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Json<RotateResponse> {
    let cache_invalidated = match &state.cache {
        Some(store) => match store.invalidate_by_item_id(&item_id) {
            Ok(count) => count,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "rotate: cache invalidation failed");
                0
            }
        },
        None => 0,
    };

    let mut stacks_redeployed = Vec::new();
    if let Some(orchestrator) = &state.orchestrator {
        for stack in state.index.stacks_for_item(&item_id) {
            if let Err(e) = orchestrator.deploy_stack(&stack).await {
                error!(stack = %stack, error = %e, "rotate: failed to redeploy stack");
                continue;
            }
            if let Some(auditor) = &state.auditor {
                auditor.log(audit::Entry {
                    action: "rotate".to_string(),
                    stack: stack.clone(),
                    secret: item_id.clone(),
                    triggered_by: "rotation-webhook".to_string(),
                    ..audit::Entry::default()
                });
            }
            stacks_redeployed.push(stack);
        }
    }

    info!(
        item_id = %item_id,
        cache_invalidated,
        redeployed = stacks_redeployed.len(),
        "rotate: complete"
    );

    Json(RotateResponse { item_id, cache_invalidated, stacks_redeployed })
}
