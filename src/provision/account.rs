//! Service-account provisioner: item creation against the vendor's hosted
//! API using the dedicated provisioning token.

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
const DEFAULT_API_URL: &str = "https://secrets.1password.com";

#[derive(Debug, Deserialize)]
struct VaultSummary {
    id: String,
    #[serde(alias = "name")]
    title: String,
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
    vault_id: String,
    title: String,
    category: String,
    #[serde(default)]
    fields: Vec<FieldPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldPayload {
    id: String,
    title: String,
    field_type: String, // "Text" or "Concealed"
    value: String,
}

/// Provisioner backed by a service-account provisioning token
/// (`OP_PROVISION_TOKEN`).
pub struct AccountProvisioner {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl AccountProvisioner {
    /// Build from `OP_PROVISION_TOKEN` in the environment.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("OP_PROVISION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::config("OP_PROVISION_TOKEN is not set"))?;
        Ok(Self::new(DEFAULT_API_URL, &token))
    }

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
            .map_err(|e| Error::http(format!("provision GET {path}: {e}"), 502))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::http(format!("provision GET {path}"), status.as_u16()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::http(format!("provision GET {path}: decode: {e}"), 502))
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
            .map_err(|e| Error::http(format!("provision {method} {path}: {e}"), 502))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::http(format!("provision {method} {path}"), status.as_u16()));
        }
        resp.json::<ItemPayload>()
            .await
            .map_err(|e| Error::http(format!("provision {method} {path}: decode: {e}"), 502))
    }

    async fn find_vault_id(&self, name: &str) -> Result<String> {
        let vaults: Vec<VaultSummary> = self.get_json("/v1/vaults").await?;
        vaults
            .into_iter()
            .find(|v| v.title.eq_ignore_ascii_case(name))
            .map(|v| v.id)
            .ok_or_else(|| Error::http(format!("vault {name:?} not found"), 404))
    }

    async fn find_item_id(&self, vault_id: &str, title: &str) -> Result<Option<String>> {
        let items: Vec<ItemSummary> =
            self.get_json(&format!("/v1/vaults/{vault_id}/items")).await?;
        Ok(items.into_iter().find(|i| i.title.eq_ignore_ascii_case(title)).map(|i| i.id))
    }
}

#[async_trait]
impl Provision for AccountProvisioner {
    fn kind(&self) -> &'static str {
        "sdk"
    }

    async fn provision(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
        let vault_id = self.find_vault_id(&req.vault).await?;

        let item = match self.find_item_id(&vault_id, &req.item).await? {
            None => {
                let payload = ItemPayload {
                    id: String::new(),
                    vault_id: vault_id.clone(),
                    title: req.item.clone(),
                    category: upstream_category(&req.category).to_string(),
                    fields: req.fields.iter().map(|(n, s)| build_field(n, s)).collect(),
                };
                self.send_item(
                    reqwest::Method::POST,
                    &format!("/v1/vaults/{vault_id}/items"),
                    &payload,
                )
                .await?
            }
            Some(item_id) => {
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
                    self.send_item(reqwest::Method::PUT, &path, &existing).await?
                } else {
                    existing
                }
            }
        };

        let refs: BTreeMap<String, String> = item
            .fields
            .iter()
            .filter(|f| !f.id.is_empty())
            .map(|f| (f.id.clone(), op_uri(&req.vault, &req.item, &f.id)))
            .collect();
        Ok(ProvisionOutcome { vault_id, item_id: item.id, refs })
    }
}

fn build_field(name: &str, spec: &FieldSpec) -> FieldPayload {
    let value = if spec.value.is_empty() { generate_secret() } else { spec.value.clone() };
    let field_type =
        if spec.concealed || is_likely_secret(name) { "Concealed" } else { "Text" };
    FieldPayload {
        id: name.to_string(),
        title: name.to_string(),
        field_type: field_type.to_string(),
        value,
    }
}
