//! # Audit Log
//!
//! Append-only JSONL record of every secret delivery and rotation. A single
//! mutex serialises appends, queries, and pruning, so entries are totally
//! ordered. Append failures are counted and logged rather than propagated —
//! losing an audit line must never fail the operation being audited.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Error, Result};

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub ts: DateTime<Utc>,
    pub action: String,
    pub stack: String,
    pub secret: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delivery: Vec<String>,
    pub policy: String,
    pub cache_hit: bool,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub triggered_by: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            ts: Utc::now(),
            action: String::new(),
            stack: String::new(),
            secret: String::new(),
            provider: String::new(),
            delivery: Vec::new(),
            policy: String::new(),
            cache_hit: false,
            duration_ms: 0,
            triggered_by: String::new(),
            error: String::new(),
        }
    }
}

/// Filters for [`Logger::query`]. Empty strings and a zero `hours` window
/// disable the respective filter.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub stack: String,
    pub secret: String,
    pub hours: u32,
}

struct Inner {
    file: File,
    path: PathBuf,
}

/// Append-only JSONL audit logger.
pub struct Logger {
    inner: Mutex<Inner>,
    dropped: AtomicU64,
}

impl Logger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self { inner: Mutex::new(Inner { file, path }), dropped: AtomicU64::new(0) })
    }

    /// Append an entry, stamping `ts` with the current UTC instant. Failures
    /// are logged and counted, never returned.
    pub fn log(&self, mut entry: Entry) {
        entry.ts = Utc::now();
        let mut line = match serde_json::to_vec(&entry) {
            Ok(l) => l,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, action = %entry.action, "audit: failed to marshal entry");
                return;
            }
        };
        line.push(b'\n');

        let mut inner = self.inner.lock().unwrap();
        if let Err(e) = inner.file.write_all(&line) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, action = %entry.action, "audit: failed to append entry");
        }
    }

    /// Number of entries lost to marshal or write failures since open.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Scan the log, newest filters applied per line; malformed lines are
    /// skipped.
    pub fn query(&self, opts: &QueryOptions) -> Result<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        let file = File::open(&inner.path)
            .map_err(|e| Error::io(e, format!("open audit log {:?}", inner.path)))?;

        let cutoff =
            if opts.hours > 0 { Some(Utc::now() - Duration::hours(opts.hours as i64)) } else { None };

        let mut results = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(e, "read audit log"))?;
            let Ok(entry) = serde_json::from_str::<Entry>(&line) else {
                continue;
            };
            if !opts.stack.is_empty() && !entry.stack.eq_ignore_ascii_case(&opts.stack) {
                continue;
            }
            if !opts.secret.is_empty() && !entry.secret.eq_ignore_ascii_case(&opts.secret) {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if entry.ts < cutoff {
                    continue;
                }
            }
            results.push(entry);
        }
        Ok(results)
    }

    /// Drop entries older than `retention_days`, preserving unparseable lines
    /// to avoid silent data loss. Rewrites via a tmp-file swap and reopens
    /// the append handle. No-op when retention is 0.
    pub fn prune(&self, retention_days: u32) -> Result<()> {
        if retention_days == 0 {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        let cutoff = Utc::now() - Duration::days(retention_days as i64);

        let file = File::open(&inner.path)
            .map_err(|e| Error::io(e, format!("open audit log {:?}", inner.path)))?;
        let mut keep: Vec<String> = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(e, "read audit log"))?;
            match serde_json::from_str::<Entry>(&line) {
                Ok(entry) => {
                    if entry.ts >= cutoff {
                        keep.push(line);
                    }
                }
                // Preserve unparseable lines
                Err(_) => keep.push(line),
            }
        }

        let tmp_path = inner.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)
                .map_err(|e| Error::io(e, format!("create {:?}", tmp_path)))?;
            for line in &keep {
                tmp.write_all(line.as_bytes()).map_err(|e| Error::io(e, "write pruned log"))?;
                tmp.write_all(b"\n").map_err(|e| Error::io(e, "write pruned log"))?;
            }
        }
        std::fs::rename(&tmp_path, &inner.path)
            .map_err(|e| Error::io(e, "swap pruned audit log"))?;

        // Point the append handle at the new file
        inner.file = open_append(&inner.path)?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(e, format!("open audit log {path:?}")))
}
