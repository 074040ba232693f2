use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::audit;
use crate::index::StackInfo;
use crate::materialize::EnvMaterializer;
use crate::resolver::scan_env;

const MATERIALIZE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct MaterializeEnvRequest {
    pub stack: String,
    #[serde(default)]
    pub out_path: String,
    /// Raw env file content with `op://` refs
    #[serde(default)]
    pub env_content: String,
    /// Skip cache read *and* write-back — always fetch fresh
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct MaterializeEnvResponse {
    pub content: String,
    pub resolved: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub out_path: String,
}

/// `POST /v1/materialize/env`
pub async fn materialize_env(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MaterializeEnvRequest>,
) -> Result<Json<MaterializeEnvResponse>, ApiError> {
    if req.stack.is_empty() {
        return Err(ApiError::bad_request("stack is required"));
    }

    let refs = scan_env(&req.env_content).map_err(|e| {
        error!(stack = %req.stack, error = %e, "materialize: failed to scan env content");
        ApiError::bad_request(format!("failed to scan env content: {e}"))
    })?;

    if refs.is_empty() {
        // No secrets — return env content unchanged
        return Ok(Json(MaterializeEnvResponse {
            content: req.env_content,
            resolved: 0,
            cache_hits: 0,
            failed: 0,
            duration_ms: 0,
            out_path: req.out_path,
        }));
    }

    if state.manager.is_empty() {
        return Err(ApiError::service_unavailable("no secret provider configured"));
    }

    let store = if req.bypass_cache { None } else { state.cache.clone() };
    let mat = EnvMaterializer::new(
        store,
        Arc::clone(&state.manager),
        state.config.cache.default_policy,
        state.config.cache.default_ttl,
    );
    let out_path = (!req.out_path.is_empty()).then(|| Path::new(&req.out_path));

    let materialized = tokio::time::timeout(
        MATERIALIZE_DEADLINE,
        mat.materialize(&req.stack, &refs, &req.env_content, out_path),
    )
    .await
    .map_err(|_| {
        error!(stack = %req.stack, "materialize: deadline exceeded");
        ApiError::internal("materialize timed out")
    })?
    .map_err(|e| {
        error!(stack = %req.stack, out = %req.out_path, error = %e, "materialize: failed");
        ApiError::from(e)
    })?;

    // Track which stacks reference which items, enabling /v1/inventory
    // queries and /v1/rotate/{item} targeted redeployment.
    let mut item_refs: HashMap<String, Vec<String>> = HashMap::new();
    for (raw_uri, secret_ref) in &refs {
        item_refs.entry(secret_ref.item.clone()).or_default().push(raw_uri.clone());
    }
    state.index.upsert(
        &req.stack,
        StackInfo {
            secret_count: refs.len(),
            providers: state.manager.names(),
            policies: vec![state.config.cache.default_policy.to_string()],
            last_synced: Utc::now(),
            item_refs,
        },
    );

    if let Some(auditor) = &state.auditor {
        for r in &materialized.resolutions {
            auditor.log(audit::Entry {
                action: "materialize".to_string(),
                stack: req.stack.clone(),
                secret: r.raw_uri.clone(),
                provider: r.provider.clone(),
                policy: state.config.cache.default_policy.to_string(),
                cache_hit: r.cache_hit,
                duration_ms: materialized.stats.duration_ms,
                ..audit::Entry::default()
            });
        }
    }

    info!(
        stack = %req.stack,
        out = %req.out_path,
        resolved = materialized.stats.resolved,
        cache_hits = materialized.stats.cache_hits,
        duration_ms = materialized.stats.duration_ms,
        "materialize: complete"
    );

    Ok(Json(MaterializeEnvResponse {
        content: materialized.content,
        resolved: materialized.stats.resolved,
        cache_hits: materialized.stats.cache_hits,
        failed: materialized.stats.failed,
        duration_ms: materialized.stats.duration_ms,
        out_path: req.out_path,
    }))
}
