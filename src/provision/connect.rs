//! Connect-server provisioner: item creation over the vault server's REST
//! API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    generate_secret, is_likely_secret, op_uri, upstream_category, FieldSpec, Provision,
    ProvisionOutcome, ProvisionRequest,
};
use crate::errors::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct VaultSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ItemSummary {
    id: String,
    title: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    vault: VaultRef,
    title: String,
    category: String,
    #[serde(default)]
    fields: Vec<FieldPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VaultRef {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldPayload {
    id: String,
    label: String,
    #[serde(rename = "type")]
    kind: String, // "STRING" or "CONCEALED"
    value: String,
}

/// Provisioner backed by the Connect server.
pub struct ConnectProvisioner {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl ConnectProvisioner {
    pub fn new(url: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self { url: url.trim_end_matches('/').to_string(), token: token.to_string(), client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{}", self.url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::http(format!("connect GET {path}: {e}"), 502))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::http(format!("connect GET {path}"), status.as_u16()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::http(format!("connect GET {path}: decode: {e}"), 502))
    }

    async fn send_item(
        &self,
        method: reqwest::Method,
        path: &str,
        item: &ItemPayload,
    ) -> Result<ItemPayload> {
        let resp = self
            .client
            .request(method.clone(), format!("{}{}", self.url, path))
            .bearer_auth(&self.token)
            .json(item)
            .send()
            .await
            .map_err(|e| Error::http(format!("connect {method} {path}: {e}"), 502))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::http(format!("connect {method} {path}"), status.as_u16()));
        }
        resp.json::<ItemPayload>()
            .await
            .map_err(|e| Error::http(format!("connect {method} {path}: decode: {e}"), 502))
    }

    async fn find_vault_id(&self, name: &str) -> Result<String> {
        let vaults: Vec<VaultSummary> = self.get_json("/v1/vaults").await?;
        vaults
            .into_iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .map(|v| v.id)
            .ok_or_else(|| Error::http(format!("vault {name:?} not found"), 404))
    }

    /// ID of the first item with the given title, or `None`.
    async fn find_item_id(&self, vault_id: &str, title: &str) -> Result<Option<String>> {
        let items: Vec<ItemSummary> =
            self.get_json(&format!("/v1/vaults/{vault_id}/items")).await?;
        Ok(items.into_iter().find(|i| i.title.eq_ignore_ascii_case(title)).map(|i| i.id))
    }

    async fn create(&self, vault_id: &str, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
        let mut fields = Vec::with_capacity(req.fields.len());
        for (name, spec) in &req.fields {
            fields.push(build_field(name, spec));
        }
        let item = ItemPayload {
            id: String::new(),
            vault: VaultRef { id: vault_id.to_string() },
            title: req.item.clone(),
            category: upstream_category(&req.category).to_string(),
            fields,
        };

        let created = self
            .send_item(reqwest::Method::POST, &format!("/v1/vaults/{vault_id}/items"), &item)
            .await?;
        Ok(outcome(vault_id, &created, req))
    }

    async fn upsert(
        &self,
        vault_id: &str,
        item_id: &str,
        req: &ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        let path = format!("/v1/vaults/{vault_id}/items/{item_id}");
        let mut existing: ItemPayload = self.get_json(&path).await?;

        let have: std::collections::HashSet<String> =
            existing.fields.iter().map(|f| f.id.clone()).collect();

        let mut added_any = false;
        for (name, spec) in &req.fields {
            if have.contains(name) {
                continue;
            }
            existing.fields.push(build_field(name, spec));
            added_any = true;
        }

        if added_any {
            existing = self.send_item(reqwest::Method::PUT, &path, &existing).await?;
        }
        Ok(outcome(vault_id, &existing, req))
    }
}

#[async_trait]
impl Provision for ConnectProvisioner {
    fn kind(&self) -> &'static str {
        "connect"
    }

    async fn provision(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
        let vault_id = self.find_vault_id(&req.vault).await?;
        match self.find_item_id(&vault_id, &req.item).await? {
            Some(item_id) => self.upsert(&vault_id, &item_id, req).await,
            None => self.create(&vault_id, req).await,
        }
    }
}

fn build_field(name: &str, spec: &FieldSpec) -> FieldPayload {
    let value = if spec.value.is_empty() { generate_secret() } else { spec.value.clone() };
    let kind = if spec.concealed || is_likely_secret(name) { "CONCEALED" } else { "STRING" };
    FieldPayload { id: name.to_string(), label: name.to_string(), kind: kind.to_string(), value }
}

fn outcome(vault_id: &str, item: &ItemPayload, req: &ProvisionRequest) -> ProvisionOutcome {
    let refs: BTreeMap<String, String> = item
        .fields
        .iter()
        .filter(|f| !f.id.is_empty())
        .map(|f| (f.id.clone(), op_uri(&req.vault, &req.item, &f.id)))
        .collect();
    ProvisionOutcome { vault_id: vault_id.to_string(), item_id: item.id.clone(), refs }
}
