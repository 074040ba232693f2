use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::provision::{FieldSpec, ProvisionRequest};

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub vault: String,
    pub item: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub vault_id: String,
    pub item_id: String,
    /// field name → `op://` URI
    pub refs: BTreeMap<String, String>,
}

/// `POST /v1/provision`
pub async fn provision_item(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProvisionBody>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    if body.vault.is_empty() {
        return Err(ApiError::bad_request("vault is required"));
    }
    if body.item.is_empty() {
        return Err(ApiError::bad_request("item is required"));
    }
    if body.fields.is_empty() {
        return Err(ApiError::bad_request("at least one field is required"));
    }

    let Some(provisioner) = &state.provisioner else {
        return Err(ApiError::service_unavailable("provisioning unavailable: no write token configured"));
    };

    let outcome = provisioner
        .provision(&ProvisionRequest {
            vault: body.vault.clone(),
            item: body.item.clone(),
            category: body.category,
            fields: body.fields,
        })
        .await
        .map_err(|e| {
            error!(vault = %body.vault, item = %body.item, error = %e, "provision: failed");
            ApiError::internal(format!("provision failed: {e}"))
        })?;

    info!(
        vault = %body.vault,
        item = %body.item,
        item_id = %outcome.item_id,
        fields = outcome.refs.len(),
        "provision: item created"
    );

    Ok(Json(ProvisionResponse {
        vault_id: outcome.vault_id,
        item_id: outcome.item_id,
        refs: outcome.refs,
    }))
}
