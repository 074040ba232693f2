//! Connect-server provider: three-call resolution over the vault server's
//! HTTP+JSON API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{HealthProbe, ProviderKind, SecretProvider};
use crate::errors::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

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

#[derive(Debug, Deserialize)]
struct ItemDetail {
    #[serde(default)]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    #[serde(default)]
    label: String,
    #[serde(default)]
    value: String,
}

/// Provider backed by a vault Connect server.
///
/// Resolution walks the REST API: list vaults (match by name, case-sensitive)
/// → list items in the vault (match by title) → get the item → select the
/// field by label.
pub struct ConnectProvider {
    name: String,
    url: String,
    token: String,
    priority: u32,
    client: reqwest::Client,
}

impl ConnectProvider {
    pub fn new(name: &str, url: &str, token: &str, priority: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            priority,
            client,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{}", self.url, path))
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider(&self.name, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::provider(
                &self.name,
                format!("GET {path}: HTTP {}", status.as_u16()),
            ));
        }
        resp.json::<T>().await.map_err(|e| Error::provider(&self.name, e.to_string()))
    }

    async fn find_vault_id(&self, vault: &str) -> Result<String> {
        let vaults: Vec<VaultSummary> = self.get_json("/v1/vaults").await?;
        vaults
            .into_iter()
            .find(|v| v.name == vault)
            .map(|v| v.id)
            .ok_or_else(|| Error::provider(&self.name, format!("vault {vault:?} not found")))
    }

    async fn find_item_id(&self, vault_id: &str, title: &str) -> Result<String> {
        let items: Vec<ItemSummary> =
            self.get_json(&format!("/v1/vaults/{vault_id}/items")).await?;
        items.into_iter().find(|i| i.title == title).map(|i| i.id).ok_or_else(|| {
            Error::provider(&self.name, format!("item {title:?} not found in vault {vault_id:?}"))
        })
    }

    async fn get_field(&self, vault_id: &str, item_id: &str, field_label: &str) -> Result<String> {
        let item: ItemDetail =
            self.get_json(&format!("/v1/vaults/{vault_id}/items/{item_id}")).await?;
        item.fields
            .into_iter()
            .find(|f| f.label == field_label)
            .map(|f| f.value)
            .ok_or_else(|| {
                Error::provider(
                    &self.name,
                    format!("field {field_label:?} not found in item {item_id:?}"),
                )
            })
    }
}

#[async_trait]
impl SecretProvider for ConnectProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ConnectServer
    }

    async fn resolve(&self, vault: &str, item: &str, field: &str) -> Result<String> {
        let vault_id = self.find_vault_id(vault).await?;
        let item_id = self.find_item_id(&vault_id, item).await?;
        self.get_field(&vault_id, &item_id, field).await
    }

    async fn healthy(&self) -> HealthProbe {
        let start = Instant::now();
        let result = self
            .client
            .get(format!("{}/v1/vaults", self.url))
            .bearer_auth(&self.token)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i64;
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => {
                HealthProbe { ok: true, latency_ms, error: None }
            }
            Ok(resp) => HealthProbe {
                ok: false,
                latency_ms,
                error: Some(format!("health check returned HTTP {}", resp.status().as_u16())),
            },
            Err(e) => HealthProbe { ok: false, latency_ms, error: Some(e.to_string()) },
        }
    }
}
