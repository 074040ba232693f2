use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use herald::api::{self, watcher, AppState};
use herald::cache::Store;
use herald::config::AppConfig;
use herald::index::StackIndex;
use herald::orchestrator::{AlertSink, OrchestratorClient};
use herald::provision::{AccountProvisioner, ConnectProvisioner, Provision};
use herald::{audit, provider, Result, APP_NAME, VERSION};

const AUDIT_PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info".into()),
        )
        .init();

    info!(app_name = APP_NAME, version = VERSION, "starting herald");

    if let Err(e) = run().await {
        error!(error = %e, "herald exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load(&std::env::var("HERALD_CONFIG").unwrap_or_default())?;
    let manager = Arc::new(provider::from_config(&config.providers)?);

    // Cache and the persistent index share one database file; no encryption
    // key means no durable state at all.
    let (cache, index) = if config.cache.encryption_key.is_empty() {
        warn!("HERALD_CACHE_KEY not set — cache disabled, secrets fetched fresh on every request");
        (None, Arc::new(StackIndex::new()))
    } else {
        let store = Arc::new(Store::open(&config.cache.data_path, &config.cache.encryption_key)?);
        info!(
            path = %config.cache.data_path.display(),
            ttl = config.cache.default_ttl,
            "cache initialized"
        );
        let index = match StackIndex::with_db(store.database()) {
            Ok(idx) => Arc::new(idx),
            Err(e) => {
                warn!(error = %e, "failed to load persistent index, continuing in memory");
                Arc::new(StackIndex::new())
            }
        };
        (Some(store), index)
    };

    let mut state = AppState::new(config.clone(), manager, index);
    if let Some(store) = cache {
        state = state.with_cache(store);
    }

    let mut prune_task = None;
    if config.audit.enabled && !config.audit.path.as_os_str().is_empty() {
        let auditor = Arc::new(audit::Logger::open(&config.audit.path)?);
        info!(path = %config.audit.path.display(), "auditor initialized");
        state = state.with_auditor(Arc::clone(&auditor));

        let retention_days = config.audit.retention_days;
        if retention_days > 0 {
            prune_task = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(AUDIT_PRUNE_INTERVAL);
                loop {
                    ticker.tick().await;
                    match auditor.prune(retention_days) {
                        Ok(()) => info!(retention_days, "audit log pruned"),
                        Err(e) => warn!(error = %e, "audit prune failed"),
                    }
                }
            }));
        }
    }

    let mut orchestrator = None;
    if config.orchestrator.is_configured() {
        let client = Arc::new(OrchestratorClient::new(
            &config.orchestrator.url,
            &config.orchestrator.api_key,
            &config.orchestrator.api_secret,
        ));
        info!(url = %config.orchestrator.url, "orchestrator client initialized");
        state = state.with_orchestrator(Arc::clone(&client));
        orchestrator = Some(client);
    }

    // Prefer the Connect provisioner: write access without hosted rate limits
    match build_provisioner() {
        Some(p) => {
            info!(kind = p.kind(), "provisioner initialized");
            state = state.with_provisioner(p);
        }
        None => warn!("no provisioning token configured — /v1/provision unavailable"),
    }

    let state = Arc::new(state);

    let watcher_task = orchestrator.map(|sink| {
        watcher::spawn_health_watcher(Arc::clone(&state), sink as Arc<dyn AlertSink>)
    });

    let result = api::serve(state).await;

    if let Some(task) = watcher_task {
        task.abort();
    }
    if let Some(task) = prune_task {
        task.abort();
    }
    result
}

fn build_provisioner() -> Option<Arc<dyn Provision>> {
    let connect_url = std::env::var("OP_CONNECT_SERVER_URL").unwrap_or_default();
    if !connect_url.is_empty() {
        match std::env::var("OP_CONNECT_TOKEN") {
            Ok(token) if !token.is_empty() => {
                return Some(Arc::new(ConnectProvisioner::new(&connect_url, &token)));
            }
            _ => {
                warn!("OP_CONNECT_SERVER_URL set but OP_CONNECT_TOKEN missing");
            }
        }
    }
    match AccountProvisioner::from_env() {
        Ok(p) => Some(Arc::new(p)),
        Err(_) => None,
    }
}
