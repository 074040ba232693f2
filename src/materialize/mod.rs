//! # Env Materialization
//!
//! Orchestrates the resolution pipeline: for every scanned reference, probe
//! the cache, fall back to the provider manager, write successful values back
//! through the cache, then substitute into the template. A single
//! unresolvable reference aborts the whole call — callers never receive
//! partial output.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::cache::{Entry, Policy, Store};
use crate::errors::{Error, Result};
use crate::provider::Manager;
use crate::resolver::{substitute, SecretRef};

/// Counters for one materialize call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub resolved: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub duration_ms: i64,
}

/// How one reference was satisfied, for audit purposes.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub raw_uri: String,
    /// Name of the provider that produced the value (for a cache hit, the
    /// provider recorded when the entry was written)
    pub provider: String,
    pub cache_hit: bool,
}

/// Result of a successful materialize call.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub content: String,
    pub stats: Stats,
    pub resolutions: Vec<Resolution>,
}

/// Resolves all `op://` refs in an env template and produces the substituted
/// content.
pub struct EnvMaterializer {
    store: Option<Arc<Store>>,
    manager: Arc<Manager>,
    default_policy: Policy,
    default_ttl: u64,
}

impl EnvMaterializer {
    /// `store = None` disables both cache reads and write-back (the
    /// bypass-cache path).
    pub fn new(
        store: Option<Arc<Store>>,
        manager: Arc<Manager>,
        default_policy: Policy,
        default_ttl: u64,
    ) -> Self {
        Self { store, manager, default_policy, default_ttl }
    }

    /// Resolve every reference and return the substituted env content plus
    /// counters. If `out_path` is set the content is also written there with
    /// mode 0600, truncating any previous file.
    pub async fn materialize(
        &self,
        stack: &str,
        refs: &BTreeMap<String, SecretRef>,
        env_content: &str,
        out_path: Option<&Path>,
    ) -> Result<Materialized> {
        let start = Instant::now();
        let mut stats = Stats::default();
        let mut resolutions = Vec::with_capacity(refs.len());
        let mut resolved_vals: BTreeMap<String, String> = BTreeMap::new();

        for (raw_uri, secret_ref) in refs {
            let cache_key = secret_ref.cache_key();

            if let Some(store) = &self.store {
                if let Ok(entry) = store.get(&cache_key) {
                    resolved_vals.insert(raw_uri.clone(), entry.value);
                    resolutions.push(Resolution {
                        raw_uri: raw_uri.clone(),
                        provider: entry.provider,
                        cache_hit: true,
                    });
                    stats.cache_hits += 1;
                    continue;
                }
            }

            let (value, provider_name) = match self
                .manager
                .resolve(&secret_ref.vault, &secret_ref.item, &secret_ref.field)
                .await
            {
                Ok(ok) => ok,
                Err(e) => {
                    stats.failed += 1;
                    return Err(Error::MaterializeFailed {
                        uri: raw_uri.clone(),
                        source: Box::new(e),
                    });
                }
            };

            if let Some(store) = &self.store {
                let entry = Entry {
                    value: value.clone(),
                    provider: provider_name.clone(),
                    policy: self.default_policy,
                    expires_at: Utc::now() + Duration::seconds(self.default_ttl as i64),
                };
                // A failed cache write costs a refetch later, not the materialize
                if let Err(e) = store.set(&cache_key, entry) {
                    warn!(stack = %stack, key = %cache_key, error = %e, "materialize: cache write failed");
                }
            }

            resolved_vals.insert(raw_uri.clone(), value);
            resolutions.push(Resolution {
                raw_uri: raw_uri.clone(),
                provider: provider_name,
                cache_hit: false,
            });
            stats.resolved += 1;
        }

        let content = substitute(env_content, &resolved_vals);

        if let Some(path) = out_path {
            write_env_file(path, &content)?;
            info!(stack = %stack, path = %path.display(), "materialize: wrote env file");
        }

        stats.duration_ms = start.elapsed().as_millis() as i64;
        Ok(Materialized { content, stats, resolutions })
    }
}

/// Write resolved env content with owner-only permissions, truncating.
fn write_env_file(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::io(e, format!("open env file {:?}", path)))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::io(e, format!("write env file {:?}", path)))
}
