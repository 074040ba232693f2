//! # Secret Providers
//!
//! Backend abstraction for resolving `op://` references. Providers implement
//! the [`SecretProvider`] trait; the [`Manager`] holds them in priority order
//! and falls back down the list until one succeeds. The optional rate-limit
//! capability is a default trait method so that only backends subject to
//! upstream rate limiting need to track it.

mod connect;
mod manager;
mod service_account;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::errors::{Error, Result};

pub use connect::ConnectProvider;
pub use manager::{Manager, ProviderHealth};
pub use service_account::ServiceAccountProvider;

/// Backend kind, as it appears in config and health responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    ConnectServer,
    ServiceAccount,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ConnectServer => "connect_server",
            ProviderKind::ServiceAccount => "service_account",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single health probe.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub ok: bool,
    pub latency_ms: i64,
    pub error: Option<String>,
}

/// A backend capable of resolving `op://vault/item/field` references.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Unique identifier for this provider.
    fn name(&self) -> &str;

    /// Priority (lower = higher priority).
    fn priority(&self) -> u32;

    /// Backend kind.
    fn kind(&self) -> ProviderKind;

    /// Fetch a secret value by vault/item/field.
    async fn resolve(&self, vault: &str, item: &str, field: &str) -> Result<String>;

    /// Check if the provider is reachable.
    async fn healthy(&self) -> HealthProbe;

    /// When the provider first started refusing requests with a rate-limit
    /// error, or `None` if not currently rate limited. Backends without
    /// rate-limit tracking keep the default.
    fn rate_limited_since(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Build a [`Manager`] from the config's provider list.
pub fn from_config(providers: &[ProviderConfig]) -> Result<Manager> {
    let mut built: Vec<std::sync::Arc<dyn SecretProvider>> = Vec::with_capacity(providers.len());
    for pc in providers {
        match pc.kind.as_str() {
            "connect_server" => {
                built.push(std::sync::Arc::new(ConnectProvider::new(
                    &pc.name,
                    &pc.url,
                    &pc.token,
                    pc.priority,
                )));
            }
            "service_account" => {
                let p = ServiceAccountProvider::new(&pc.name, &pc.url, &pc.token, pc.priority)
                    .map_err(|e| Error::config(format!("provider {:?}: {e}", pc.name)))?;
                built.push(std::sync::Arc::new(p));
            }
            other => {
                return Err(Error::config(format!("unknown provider type: {other:?}")));
            }
        }
    }
    Ok(Manager::new(built))
}
