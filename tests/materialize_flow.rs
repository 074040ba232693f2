//! End-to-end resolution scenarios driving the materializer against mock
//! providers and a real on-disk cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use herald::cache::{Policy, Store};
use herald::errors::{Error, Result};
use herald::materialize::EnvMaterializer;
use herald::provider::{HealthProbe, Manager, ProviderKind, SecretProvider};
use herald::resolver::scan_env;

/// Provider that serves a fixed value for every field, or an error for items
/// named `MISSING`.
struct MockProvider {
    name: &'static str,
    priority: u32,
    value: Option<&'static str>,
    calls: AtomicUsize,
}

impl MockProvider {
    fn serving(name: &'static str, priority: u32, value: &'static str) -> Arc<Self> {
        Arc::new(Self { name, priority, value: Some(value), calls: AtomicUsize::new(0) })
    }

    fn failing(name: &'static str, priority: u32) -> Arc<Self> {
        Arc::new(Self { name, priority, value: None, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl SecretProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ConnectServer
    }

    async fn resolve(&self, _vault: &str, item: &str, _field: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.value {
            Some(v) if item != "MISSING" => Ok(v.to_string()),
            Some(_) => Err(Error::provider(self.name, format!("item {item:?} not found"))),
            None => Err(Error::provider(self.name, "backend unavailable")),
        }
    }

    async fn healthy(&self) -> HealthProbe {
        HealthProbe { ok: self.value.is_some(), latency_ms: 1, error: None }
    }
}

fn open_store(dir: &tempfile::TempDir) -> Arc<Store> {
    Arc::new(Store::open(dir.path().join("cache.db"), "integration-test-passphrase").unwrap())
}

#[tokio::test]
async fn simple_template_resolves_and_counts() {
    let provider = MockProvider::serving("mock", 1, "s3cr3t");
    let manager = Arc::new(Manager::new(vec![provider.clone()]));
    let template = "DB=op://V/i/password\n";
    let refs = scan_env(template).unwrap();

    let mat = EnvMaterializer::new(None, manager, Policy::Memory, 3600);
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!(out.content, "DB=s3cr3t\n");
    assert_eq!(out.stats.resolved, 1);
    assert_eq!(out.stats.cache_hits, 0);
    assert_eq!(out.stats.failed, 0);
}

#[tokio::test]
async fn warm_cache_short_circuits_provider() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let provider = MockProvider::serving("mock", 1, "s3cr3t");
    let manager = Arc::new(Manager::new(vec![provider.clone()]));
    let template = "DB=op://V/i/password\n";
    let refs = scan_env(template).unwrap();

    let mat = EnvMaterializer::new(Some(store), manager, Policy::Encrypted, 3600);
    let cold = mat.materialize("web", &refs, template, None).await.unwrap();
    assert_eq!((cold.stats.resolved, cold.stats.cache_hits), (1, 0));

    let warm = mat.materialize("web", &refs, template, None).await.unwrap();
    assert_eq!(warm.content, "DB=s3cr3t\n");
    assert_eq!((warm.stats.resolved, warm.stats.cache_hits), (0, 1));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warm_cache_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let template = "DB=op://V/i/password\n";
    let refs = scan_env(template).unwrap();

    {
        let store = open_store(&dir);
        let manager = Arc::new(Manager::new(vec![MockProvider::serving("mock", 1, "s3cr3t")]));
        let mat = EnvMaterializer::new(Some(store), manager, Policy::Encrypted, 3600);
        mat.materialize("web", &refs, template, None).await.unwrap();
    }

    // New store over the same file, provider now failing: value comes from disk
    let store = open_store(&dir);
    let manager = Arc::new(Manager::new(vec![MockProvider::failing("mock", 1)]));
    let mat = EnvMaterializer::new(Some(store), manager, Policy::Encrypted, 3600);
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!(out.content, "DB=s3cr3t\n");
    assert_eq!((out.stats.resolved, out.stats.cache_hits), (0, 1));
}

#[tokio::test]
async fn embedded_uri_in_connection_string() {
    let manager = Arc::new(Manager::new(vec![MockProvider::serving("mock", 1, "pw")]));
    let template = "URL=postgres://u:op://V/i/p@h/db\nX=plain\n";
    let refs = scan_env(template).unwrap();

    let mat = EnvMaterializer::new(None, manager, Policy::Memory, 3600);
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!(out.content, "URL=postgres://u:pw@h/db\nX=plain\n");
}

#[tokio::test]
async fn repeated_reference_fetched_once_substituted_everywhere() {
    let provider = MockProvider::serving("mock", 1, "pw");
    let manager = Arc::new(Manager::new(vec![provider.clone()]));
    let template = "\
A=op://V/i/p
B=op://V/i/p
URL=amqp://guest:op://V/i/p@mq:5672
";
    let refs = scan_env(template).unwrap();
    assert_eq!(refs.len(), 1, "scanner deduplicates");

    let mat = EnvMaterializer::new(None, manager, Policy::Memory, 3600);
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!(out.content, "A=pw\nB=pw\nURL=amqp://guest:pw@mq:5672\n");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1, "provider called once");
}

#[tokio::test]
async fn fallback_provider_serves_when_primary_errors() {
    let primary = MockProvider::failing("primary", 1);
    let fallback = MockProvider::serving("fallback", 2, "fb");
    let manager = Arc::new(Manager::new(vec![primary.clone(), fallback.clone()]));
    let template = "KEY=op://V/i/f\n";
    let refs = scan_env(template).unwrap();

    let mat = EnvMaterializer::new(None, manager, Policy::Memory, 3600);
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!(out.content, "KEY=fb\n");
    assert_eq!((out.stats.resolved, out.stats.cache_hits), (1, 0));
    assert_eq!(out.resolutions[0].provider, "fallback");
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_item_fails_whole_call_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(Manager::new(vec![MockProvider::serving("mock", 1, "v")]));
    let template = "OK=op://V/i/f\nBROKEN=op://V/MISSING/f\n";
    let refs = scan_env(template).unwrap();
    let out_path = dir.path().join("resolved.env");

    let mat = EnvMaterializer::new(None, manager, Policy::Memory, 3600);
    let err = mat.materialize("web", &refs, template, Some(&out_path)).await.unwrap_err();

    match err {
        Error::MaterializeFailed { uri, source } => {
            assert_eq!(uri, "op://V/MISSING/f");
            assert!(matches!(*source, Error::AllProvidersFailed { .. }));
        }
        other => panic!("expected MaterializeFailed, got {other:?}"),
    }
    assert!(!out_path.exists(), "no partial output file");
}

#[tokio::test]
async fn expired_cache_entry_triggers_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let provider = MockProvider::serving("mock", 1, "fresh");
    let manager = Arc::new(Manager::new(vec![provider.clone()]));
    let template = "KEY=op://V/i/f\n";
    let refs = scan_env(template).unwrap();

    // TTL of zero seconds: entries are expired the moment they land
    let mat = EnvMaterializer::new(Some(store.clone()), manager, Policy::Encrypted, 0);
    mat.materialize("web", &refs, template, None).await.unwrap();
    let out = mat.materialize("web", &refs, template, None).await.unwrap();

    assert_eq!((out.stats.resolved, out.stats.cache_hits), (1, 0));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    // The stale value is still reachable for degraded-mode callers
    assert_eq!(store.get_stale("V/i/f").unwrap().value, "fresh");
}
