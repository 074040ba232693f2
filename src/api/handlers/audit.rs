use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::audit::{Entry, QueryOptions};

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub hours: u32,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub entries: Vec<Entry>,
    pub count: usize,
}

/// `GET /v1/audit?stack&secret&hours`
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> Result<Json<AuditResponse>, ApiError> {
    let Some(auditor) = &state.auditor else {
        return Ok(Json(AuditResponse { entries: vec![], count: 0 }));
    };

    let entries = auditor
        .query(&QueryOptions { stack: params.stack, secret: params.secret, hours: params.hours })
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let count = entries.len();
    Ok(Json(AuditResponse { entries, count }))
}
