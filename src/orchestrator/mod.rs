//! # Deploy Orchestrator Client
//!
//! Outbound webhook sink for the deploy orchestrator: stack redeploys after
//! rotation, and operational alerts from the health watcher. The watcher
//! depends on the [`AlertSink`] trait rather than the concrete client so
//! tests can capture alerts in memory.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for watcher alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver an alert with level `critical`, `warning`, or `ok`.
    async fn send_alert(&self, level: &str, message: &str) -> Result<()>;
}

#[derive(Serialize)]
struct DeployRequest<'a> {
    stack: &'a str,
}

#[derive(Serialize)]
struct AlertRequest<'a> {
    level: &'a str,
    message: &'a str,
}

/// HTTP client for the deploy orchestrator's webhook API.
pub struct OrchestratorClient {
    url: String,
    api_key: String,
    api_secret: String,
    client: reqwest::Client,
}

impl OrchestratorClient {
    pub fn new(url: &str, api_key: &str, api_secret: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            client,
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        self.client
            .post(format!("{}{}", self.url, path))
            .header("X-Api-Key", &self.api_key)
            .header("X-Api-Secret", &self.api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::http(format!("orchestrator {path}: {e}"), 502))
    }

    /// Trigger a redeploy of the named stack.
    pub async fn deploy_stack(&self, stack: &str) -> Result<()> {
        let resp = self.post("/execute/DeployStack", &DeployRequest { stack }).await?;
        let status = resp.status();
        if status.as_u16() >= 300 {
            return Err(Error::http(
                format!("deploy stack {stack:?}: HTTP {}", status.as_u16()),
                status.as_u16(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for OrchestratorClient {
    async fn send_alert(&self, level: &str, message: &str) -> Result<()> {
        self.post("/write/SendAlert", &AlertRequest { level, message }).await?;
        Ok(())
    }
}
