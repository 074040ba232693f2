use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct StackInventory {
    pub secrets: usize,
    pub last_synced: DateTime<Utc>,
    pub providers_used: Vec<String>,
    pub policies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub stacks: HashMap<String, StackInventory>,
}

/// `GET /v1/inventory`
pub async fn inventory(State(state): State<Arc<AppState>>) -> Json<InventoryResponse> {
    let stacks = state
        .index
        .all()
        .into_iter()
        .map(|(name, info)| {
            (
                name,
                StackInventory {
                    secrets: info.secret_count,
                    last_synced: info.last_synced,
                    providers_used: info.providers,
                    policies: info.policies,
                },
            )
        })
        .collect();
    Json(InventoryResponse { stacks })
}
