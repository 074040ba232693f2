//! Service-account provider: single-call resolution of compound `op://`
//! references against the vendor's hosted API.
//!
//! Service-account tokens are subject to upstream rate limiting. The first
//! probe failure mentioning a rate limit pins `rate_limited_since` to that
//! instant; the flag survives repeated failures unchanged and clears on the
//! next successful probe.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{HealthProbe, ProviderKind, SecretProvider};
use crate::errors::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_API_URL: &str = "https://secrets.1password.com";

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    secret_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct VaultSummary {
    #[allow(dead_code)]
    id: String,
}

/// Provider backed by a service-account token.
pub struct ServiceAccountProvider {
    name: String,
    url: String,
    priority: u32,
    token: String,
    client: reqwest::Client,
    rate_limited_at: Mutex<Option<DateTime<Utc>>>,
}

impl ServiceAccountProvider {
    /// Create a provider. `url` overrides the hosted API endpoint when
    /// non-empty (used by tests and self-hosted deployments).
    pub fn new(name: &str, url: &str, token: &str, priority: u32) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::config("service account token is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        let url = if url.is_empty() { DEFAULT_API_URL } else { url };
        Ok(Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            priority,
            token: token.to_string(),
            client,
            rate_limited_at: Mutex::new(None),
        })
    }

    fn record_probe_error(&self, at: DateTime<Utc>, message: &str) {
        let mut flag = self.rate_limited_at.lock().unwrap();
        if message.contains("rate limit") {
            if flag.is_none() {
                *flag = Some(at);
                warn!(
                    provider = %self.name,
                    rate_limited_since = %at.to_rfc3339(),
                    "service account rate limit detected — provider degraded"
                );
            }
        } else {
            *flag = None;
        }
    }

    fn record_probe_success(&self) {
        let mut flag = self.rate_limited_at.lock().unwrap();
        if flag.take().is_some() {
            info!(provider = %self.name, "service account rate limit cleared — provider healthy");
        }
    }
}

#[async_trait]
impl SecretProvider for ServiceAccountProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ServiceAccount
    }

    async fn resolve(&self, vault: &str, item: &str, field: &str) -> Result<String> {
        let secret_ref = format!("op://{vault}/{item}/{field}");
        let resp = self
            .client
            .post(format!("{}/v1/resolve", self.url))
            .bearer_auth(&self.token)
            .json(&ResolveRequest { secret_ref: &secret_ref })
            .send()
            .await
            .map_err(|e| Error::provider(&self.name, format!("resolve {secret_ref}: {e}")))?;
        let status = resp.status();
        if status.as_u16() == 429 {
            let since = self.rate_limited_since().unwrap_or_else(Utc::now);
            return Err(Error::RateLimited { provider: self.name.clone(), since });
        }
        if !status.is_success() {
            return Err(Error::provider(
                &self.name,
                format!("resolve {secret_ref}: HTTP {}", status.as_u16()),
            ));
        }
        let body: ResolveResponse = resp
            .json()
            .await
            .map_err(|e| Error::provider(&self.name, format!("resolve {secret_ref}: {e}")))?;
        Ok(body.value)
    }

    async fn healthy(&self) -> HealthProbe {
        let start = Instant::now();
        let now = Utc::now();
        let result = self
            .client
            .get(format!("{}/v1/vaults", self.url))
            .bearer_auth(&self.token)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i64;

        let error = match result {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<Vec<VaultSummary>>().await {
                    Ok(_) => None,
                    Err(e) => Some(e.to_string()),
                }
            }
            Ok(resp) if resp.status().as_u16() == 429 => {
                Some(format!("rate limit exceeded (HTTP {})", resp.status().as_u16()))
            }
            Ok(resp) => Some(format!("list vaults: HTTP {}", resp.status().as_u16())),
            Err(e) => Some(e.to_string()),
        };

        match error {
            None => {
                self.record_probe_success();
                HealthProbe { ok: true, latency_ms, error: None }
            }
            Some(message) => {
                self.record_probe_error(now, &message);
                let error = if message.contains("rate limit") {
                    let since = self.rate_limited_since().unwrap_or(now);
                    Some(format!("rate limited since {}", since.to_rfc3339()))
                } else {
                    Some(message)
                };
                HealthProbe { ok: false, latency_ms, error }
            }
        }
    }

    fn rate_limited_since(&self) -> Option<DateTime<Utc>> {
        *self.rate_limited_at.lock().unwrap()
    }
}
