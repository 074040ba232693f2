//! # Encrypted Secret Cache
//!
//! Two-tier cache for resolved secret values. Entries with the `memory`
//! policy live only in an in-process map; every other policy is marshalled to
//! JSON, sealed with AES-256-GCM, and written to the durable `secrets` table
//! of the redb database. Keys use the canonical `vault/item/field` form, so
//! item-level invalidation can match on the second path segment.

mod crypto;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};

pub use crypto::SecretBox;

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Storage tier for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Memory,
    Encrypted,
    Tmpfs,
    File,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Memory => "memory",
            Policy::Encrypted => "encrypted",
            Policy::Tmpfs => "tmpfs",
            Policy::File => "file",
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Policy::Memory),
            "encrypted" => Ok(Policy::Encrypted),
            "tmpfs" => Ok(Policy::Tmpfs),
            "file" => Ok(Policy::File),
            other => Err(Error::config(format!("unknown cache policy {other:?}"))),
        }
    }
}

/// A cached secret value with its provenance and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: String,
    pub provider: String,
    pub policy: Policy,
    pub expires_at: DateTime<Utc>,
}

/// Two-tier encrypted cache store.
///
/// All public methods are safe under concurrent callers: the memory tier sits
/// behind a mutex and redb transactions are self-synchronising.
pub struct Store {
    db: Arc<Database>,
    secret_box: SecretBox,
    mem: Mutex<HashMap<String, Entry>>,
}

impl Store {
    /// Open (or create) the cache database at `path`, deriving the data key
    /// from `passphrase`.
    pub fn open<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let db = Database::create(path.as_ref())?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            secret_box: SecretBox::new(passphrase),
            mem: Mutex::new(HashMap::new()),
        })
    }

    /// Shared handle to the underlying database, for co-located tables such
    /// as the stack index.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Store an entry under `cache_key`. `memory`-policy entries never touch
    /// the durable tier.
    pub fn set(&self, cache_key: &str, entry: Entry) -> Result<()> {
        if entry.policy == Policy::Memory {
            self.mem.lock().unwrap().insert(cache_key.to_string(), entry);
            return Ok(());
        }
        let plaintext = serde_json::to_vec(&entry)?;
        let framed = self.secret_box.seal(&plaintext)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.insert(cache_key, framed.as_slice())?;
        }
        write_txn.commit()?;
        debug!(key = %cache_key, policy = %entry.policy, "cache: stored entry");
        Ok(())
    }

    /// Fetch an entry, honoring its TTL. Returns [`Error::CacheMiss`] when
    /// absent and [`Error::CacheExpired`] when past `expires_at`.
    pub fn get(&self, cache_key: &str) -> Result<Entry> {
        if let Some(entry) = self.mem.lock().unwrap().get(cache_key) {
            if Utc::now() > entry.expires_at {
                return Err(Error::CacheExpired);
            }
            return Ok(entry.clone());
        }

        let entry = self.read_durable(cache_key)?;
        if Utc::now() > entry.expires_at {
            return Err(Error::CacheExpired);
        }
        Ok(entry)
    }

    /// Fetch an entry regardless of TTL. Used to serve the last-known value
    /// when every provider is unavailable.
    pub fn get_stale(&self, cache_key: &str) -> Result<Entry> {
        if let Some(entry) = self.mem.lock().unwrap().get(cache_key) {
            return Ok(entry.clone());
        }
        self.read_durable(cache_key)
    }

    /// Remove an entry from both tiers.
    pub fn delete(&self, cache_key: &str) -> Result<()> {
        self.mem.lock().unwrap().remove(cache_key);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.remove(cache_key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove every key beginning with `prefix` from both tiers.
    pub fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.mem.lock().unwrap().retain(|k, _| !k.starts_with(prefix));

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            let keys: Vec<String> = {
                let mut keys = Vec::new();
                for item in table.range(prefix..)? {
                    let (k, _) = item?;
                    if !k.value().starts_with(prefix) {
                        break;
                    }
                    keys.push(k.value().to_string());
                }
                keys
            };
            for key in keys {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove every entry whose key's second `/`-segment equals `item_id`
    /// (key format: `vault/item/field`). Returns the number of entries
    /// removed across both tiers.
    pub fn invalidate_by_item_id(&self, item_id: &str) -> Result<usize> {
        let mut count = 0;

        {
            let mut mem = self.mem.lock().unwrap();
            let before = mem.len();
            mem.retain(|k, _| !key_matches_item(k, item_id));
            count += before - mem.len();
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            let keys: Vec<String> = {
                let mut keys = Vec::new();
                for item in table.iter()? {
                    let (k, _) = item?;
                    if key_matches_item(k.value(), item_id) {
                        keys.push(k.value().to_string());
                    }
                }
                keys
            };
            for key in &keys {
                table.remove(key.as_str())?;
            }
            count += keys.len();
        }
        write_txn.commit()?;
        Ok(count)
    }

    fn read_durable(&self, cache_key: &str) -> Result<Entry> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let framed: Vec<u8> = match table.get(cache_key)? {
            Some(guard) => guard.value().to_vec(),
            None => return Err(Error::CacheMiss),
        };
        let plaintext = self.secret_box.open(&framed)?;
        let entry: Entry = serde_json::from_slice(&plaintext)?;
        Ok(entry)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("secret_box", &self.secret_box).finish()
    }
}

fn key_matches_item(key: &str, item_id: &str) -> bool {
    let mut parts = key.split('/');
    parts.next().is_some() && parts.next() == Some(item_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("test.db"), "test-encryption-key-32chars!!").unwrap()
    }

    fn entry(value: &str, policy: Policy, ttl_secs: i64) -> Entry {
        Entry {
            value: value.to_string(),
            provider: "test".to_string(),
            policy,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn test_set_get_roundtrip_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let e = entry("s3cr3t", Policy::Encrypted, 3600);
        store.set("V/i/password", e.clone()).unwrap();
        let got = store.get("V/i/password").unwrap();
        assert_eq!(got, e);
    }

    #[test]
    fn test_memory_policy_skips_durable_tier() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("V/i/f", entry("v", Policy::Memory, 3600)).unwrap();
        assert_eq!(store.get("V/i/f").unwrap().value, "v");
        assert!(matches!(store.read_durable("V/i/f"), Err(Error::CacheMiss)));
    }

    #[test]
    fn test_get_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        assert!(matches!(store.get("V/i/f"), Err(Error::CacheMiss)));
    }

    #[test]
    fn test_expired_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let e = entry("old", Policy::Encrypted, -60);
        store.set("V/i/f", e.clone()).unwrap();
        assert!(matches!(store.get("V/i/f"), Err(Error::CacheExpired)));
        // Stale read still serves the value
        assert_eq!(store.get_stale("V/i/f").unwrap(), e);
    }

    #[test]
    fn test_expired_memory_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("V/i/f", entry("old", Policy::Memory, -60)).unwrap();
        assert!(matches!(store.get("V/i/f"), Err(Error::CacheExpired)));
        assert_eq!(store.get_stale("V/i/f").unwrap().value, "old");
    }

    #[test]
    fn test_persists_across_reopen_with_same_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let e = entry("persisted", Policy::Encrypted, 3600);
        {
            let store = Store::open(&path, "same-passphrase").unwrap();
            store.set("V/i/f", e.clone()).unwrap();
        }
        let store = Store::open(&path, "same-passphrase").unwrap();
        assert_eq!(store.get("V/i/f").unwrap(), e);
    }

    #[test]
    fn test_wrong_passphrase_surfaces_decrypt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = Store::open(&path, "passphrase-a").unwrap();
            store.set("V/i/f", entry("v", Policy::Encrypted, 3600)).unwrap();
        }
        let store = Store::open(&path, "passphrase-b").unwrap();
        assert!(matches!(store.get("V/i/f"), Err(Error::DecryptFailed)));
    }

    #[test]
    fn test_delete_removes_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("V/i/mem", entry("m", Policy::Memory, 3600)).unwrap();
        store.set("V/i/disk", entry("d", Policy::Encrypted, 3600)).unwrap();
        store.delete("V/i/mem").unwrap();
        store.delete("V/i/disk").unwrap();
        assert!(matches!(store.get("V/i/mem"), Err(Error::CacheMiss)));
        assert!(matches!(store.get("V/i/disk"), Err(Error::CacheMiss)));
    }

    #[test]
    fn test_delete_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("app/db/password", entry("1", Policy::Encrypted, 3600)).unwrap();
        store.set("app/db/user", entry("2", Policy::Memory, 3600)).unwrap();
        store.set("appendix/db/x", entry("3", Policy::Encrypted, 3600)).unwrap();
        store.set("other/db/y", entry("4", Policy::Encrypted, 3600)).unwrap();

        store.delete_prefix("app/").unwrap();

        assert!(store.get("app/db/password").is_err());
        assert!(store.get("app/db/user").is_err());
        // Prefix match is exact: "appendix/" does not start with "app/"
        assert!(store.get("appendix/db/x").is_ok());
        assert!(store.get("other/db/y").is_ok());
    }

    #[test]
    fn test_invalidate_by_item_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.set("V/item-1/password", entry("1", Policy::Encrypted, 3600)).unwrap();
        store.set("V/item-1/user", entry("2", Policy::Memory, 3600)).unwrap();
        store.set("V/item-2/password", entry("3", Policy::Encrypted, 3600)).unwrap();
        store.set("W/item-1/token", entry("4", Policy::Encrypted, 3600)).unwrap();

        let count = store.invalidate_by_item_id("item-1").unwrap();
        assert_eq!(count, 3);
        assert!(store.get("V/item-1/password").is_err());
        assert!(store.get("V/item-1/user").is_err());
        assert!(store.get("W/item-1/token").is_err());
        assert_eq!(store.get("V/item-2/password").unwrap().value, "3");
    }
}
