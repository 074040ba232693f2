//! Shared application state for the HTTP layer and the health watcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::audit;
use crate::cache::Store;
use crate::config::AppConfig;
use crate::index::StackIndex;
use crate::orchestrator::OrchestratorClient;
use crate::provider::Manager;
use crate::provision::Provision;

/// Provider probes are cached for this long; the health endpoint and the
/// watcher share the cached result rather than hammering upstreams.
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(60);

/// Body of `GET /v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,
    pub uptime_seconds: i64,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_since: Option<String>,
}

struct CachedHealth {
    response: HealthResponse,
    checked_at: Instant,
}

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub manager: Arc<Manager>,
    pub cache: Option<Arc<Store>>,
    pub index: Arc<StackIndex>,
    pub auditor: Option<Arc<audit::Logger>>,
    pub orchestrator: Option<Arc<OrchestratorClient>>,
    pub provisioner: Option<Arc<dyn Provision>>,
    started_at: Instant,
    health: RwLock<Option<CachedHealth>>,
}

impl AppState {
    pub fn new(config: AppConfig, manager: Arc<Manager>, index: Arc<StackIndex>) -> Self {
        Self {
            config,
            manager,
            cache: None,
            index,
            auditor: None,
            orchestrator: None,
            provisioner: None,
            started_at: Instant::now(),
            health: RwLock::new(None),
        }
    }

    pub fn with_cache(mut self, store: Arc<Store>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn with_auditor(mut self, auditor: Arc<audit::Logger>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub fn with_orchestrator(mut self, client: Arc<OrchestratorClient>) -> Self {
        self.orchestrator = Some(client);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provision>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.started_at.elapsed().as_secs() as i64
    }

    /// Current health, probing providers at most once per
    /// [`HEALTH_CACHE_TTL`]. Uptime is recomputed on every call.
    pub async fn health_snapshot(&self) -> HealthResponse {
        {
            let cached = self.health.read().await;
            if let Some(c) = cached.as_ref() {
                if c.checked_at.elapsed() < HEALTH_CACHE_TTL {
                    let mut resp = c.response.clone();
                    resp.uptime_seconds = self.uptime_seconds();
                    return resp;
                }
            }
        }

        let mut statuses = Vec::new();
        let mut overall_ok = true;
        for h in self.manager.health().await {
            let mut ps = ProviderStatus {
                name: h.name.clone(),
                kind: h.kind.to_string(),
                status: "ok".to_string(),
                latency_ms: h.latency_ms,
                error: None,
                rate_limited_since: None,
            };
            if !h.healthy {
                ps.status = "degraded".to_string();
                ps.error = h.error;
                overall_ok = false;
                if let Some(since) = h.rate_limited_since {
                    ps.rate_limited_since = Some(since.to_rfc3339());
                    warn!(
                        provider = %h.name,
                        rate_limited_since = %since.to_rfc3339(),
                        "provider rate limited"
                    );
                }
            }
            statuses.push(ps);
        }

        let status = if !overall_ok && !statuses.is_empty() { "degraded" } else { "ok" };
        let resp = HealthResponse {
            status: status.to_string(),
            provisioner: self.provisioner.as_ref().map(|p| p.kind().to_string()),
            uptime_seconds: self.uptime_seconds(),
            providers: statuses,
        };

        *self.health.write().await =
            Some(CachedHealth { response: resp.clone(), checked_at: Instant::now() });
        resp
    }
}
