//! Ordered-fallback resolution across the configured providers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::{ProviderKind, SecretProvider};
use crate::errors::{Error, Result};

/// Snapshot of one provider's health, as collected by [`Manager::health`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub kind: ProviderKind,
    pub healthy: bool,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_since: Option<DateTime<Utc>>,
}

/// Holds an ordered list of providers and implements fallback resolution.
pub struct Manager {
    providers: Vec<Arc<dyn SecretProvider>>,
}

impl Manager {
    /// Create a manager; providers are sorted by ascending priority.
    pub fn new(mut providers: Vec<Arc<dyn SecretProvider>>) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self { providers }
    }

    /// Attempt each provider in priority order, returning the first success
    /// as `(value, provider_name)`. When every provider fails the last error
    /// is wrapped in [`Error::AllProvidersFailed`]; an empty provider list
    /// yields [`Error::NoProviders`].
    pub async fn resolve(&self, vault: &str, item: &str, field: &str) -> Result<(String, String)> {
        let mut last_err: Option<Error> = None;
        for p in &self.providers {
            match p.resolve(vault, item, field).await {
                Ok(value) => return Ok((value, p.name().to_string())),
                Err(e) => {
                    warn!(provider = %p.name(), error = %e, "provider resolve failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(Error::AllProvidersFailed { source: Box::new(e) }),
            None => Err(Error::NoProviders),
        }
    }

    /// Probe every provider sequentially and collect health snapshots.
    /// Providers that track rate limiting carry the flag into the snapshot.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut results = Vec::with_capacity(self.providers.len());
        for p in &self.providers {
            let probe = p.healthy().await;
            results.push(ProviderHealth {
                name: p.name().to_string(),
                kind: p.kind(),
                healthy: probe.ok,
                latency_ms: probe.latency_ms,
                error: probe.error,
                rate_limited_since: p.rate_limited_since(),
            });
        }
        results
    }

    /// Names of all configured providers, in priority order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").field("providers", &self.names()).finish()
    }
}
