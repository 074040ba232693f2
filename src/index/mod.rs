//! # Stack Index
//!
//! Persistent mapping of stack name → secret references, driving rotation
//! fan-out and the inventory endpoint. The in-memory map is the source of
//! truth for reads; every mutation is written through to the `index` table of
//! the shared database so entries survive restarts. Persistence failures are
//! logged and never fail the caller — the index is advisory, not
//! transactional.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::Result;

const INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("index");

/// Metadata about a stack's secrets.
///
/// `item_refs` maps each referenced item ID to the raw `op://` URIs within
/// the stack that point at it (an item can contribute several fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInfo {
    pub secret_count: usize,
    pub providers: Vec<String>,
    pub policies: Vec<String>,
    pub last_synced: DateTime<Utc>,
    pub item_refs: HashMap<String, Vec<String>>,
}

/// Mapping of stacks to their secret references.
pub struct StackIndex {
    stacks: RwLock<HashMap<String, StackInfo>>,
    db: Option<Arc<Database>>,
}

impl StackIndex {
    /// In-memory index without persistence (cache disabled).
    pub fn new() -> Self {
        Self { stacks: RwLock::new(HashMap::new()), db: None }
    }

    /// Index backed by the `index` table of `db`. Creates the table if
    /// missing and loads previously persisted entries; malformed rows are
    /// skipped with a warning, never aborting startup.
    pub fn with_db(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(INDEX)?;
        write_txn.commit()?;

        let mut stacks = HashMap::new();
        let read_txn = db.begin_read()?;
        {
            let table = read_txn.open_table(INDEX)?;
            for item in table.iter()? {
                let (k, v) = item?;
                let stack = k.value().to_string();
                match serde_json::from_slice::<StackInfo>(v.value()) {
                    Ok(info) => {
                        stacks.insert(stack, info);
                    }
                    Err(e) => {
                        warn!(stack = %stack, error = %e, "index: skipping corrupt entry");
                    }
                }
            }
        }
        info!(stacks = stacks.len(), "index: loaded from persistent store");

        Ok(Self { stacks: RwLock::new(stacks), db: Some(db) })
    }

    /// A deep copy of the stacks map.
    pub fn all(&self) -> HashMap<String, StackInfo> {
        self.stacks.read().unwrap().clone()
    }

    /// Names of every stack whose `item_refs` contains the given item ID.
    pub fn stacks_for_item(&self, item_id: &str) -> Vec<String> {
        self.stacks
            .read()
            .unwrap()
            .iter()
            .filter(|(_, info)| info.item_refs.contains_key(item_id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Update or insert stack info, writing through to the durable table.
    pub fn upsert(&self, stack: &str, info: StackInfo) {
        self.stacks.write().unwrap().insert(stack.to_string(), info.clone());

        let Some(db) = &self.db else { return };
        let data = match serde_json::to_vec(&info) {
            Ok(d) => d,
            Err(e) => {
                error!(stack = %stack, error = %e, "index: failed to marshal for persistence");
                return;
            }
        };
        if let Err(e) = persist_put(db, stack, &data) {
            error!(stack = %stack, error = %e, "index: failed to persist");
        }
    }

    /// Remove a stack from the index and the durable table.
    pub fn delete(&self, stack: &str) {
        self.stacks.write().unwrap().remove(stack);

        let Some(db) = &self.db else { return };
        if let Err(e) = persist_delete(db, stack) {
            error!(stack = %stack, error = %e, "index: failed to delete");
        }
    }
}

impl Default for StackIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn persist_put(db: &Database, stack: &str, data: &[u8]) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(INDEX)?;
        table.insert(stack, data)?;
    }
    write_txn.commit()?;
    Ok(())
}

fn persist_delete(db: &Database, stack: &str) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(INDEX)?;
        table.remove(stack)?;
    }
    write_txn.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(items: &[(&str, &[&str])]) -> StackInfo {
        StackInfo {
            secret_count: items.iter().map(|(_, uris)| uris.len()).sum(),
            providers: vec!["connect".to_string()],
            policies: vec!["memory".to_string()],
            last_synced: Utc::now(),
            item_refs: items
                .iter()
                .map(|(item, uris)| {
                    (item.to_string(), uris.iter().map(|u| u.to_string()).collect())
                })
                .collect(),
        }
    }

    #[test]
    fn test_upsert_and_all_returns_copy() {
        let idx = StackIndex::new();
        idx.upsert("web", info(&[("item-1", &["op://V/item-1/password"])]));

        let mut copy = idx.all();
        copy.remove("web");
        // Mutating the copy leaves the index untouched
        assert_eq!(idx.all().len(), 1);
    }

    #[test]
    fn test_upsert_replaces() {
        let idx = StackIndex::new();
        idx.upsert("web", info(&[("item-1", &["op://V/item-1/a"])]));
        idx.upsert("web", info(&[("item-2", &["op://V/item-2/b", "op://V/item-2/c"])]));

        let all = idx.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all["web"].secret_count, 2);
        assert!(all["web"].item_refs.contains_key("item-2"));
        assert!(!all["web"].item_refs.contains_key("item-1"));
    }

    #[test]
    fn test_stacks_for_item() {
        let idx = StackIndex::new();
        idx.upsert("web", info(&[("shared-db", &["op://V/shared-db/password"])]));
        idx.upsert("worker", info(&[("shared-db", &["op://V/shared-db/password"])]));
        idx.upsert("other", info(&[("redis", &["op://V/redis/password"])]));

        let mut stacks = idx.stacks_for_item("shared-db");
        stacks.sort();
        assert_eq!(stacks, vec!["web", "worker"]);
        assert!(idx.stacks_for_item("missing").is_empty());
    }

    #[test]
    fn test_delete() {
        let idx = StackIndex::new();
        idx.upsert("web", info(&[("item-1", &["op://V/item-1/a"])]));
        idx.delete("web");
        assert!(idx.all().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let db = Arc::new(Database::create(&path).unwrap());
            let idx = StackIndex::with_db(db).unwrap();
            idx.upsert("web", info(&[("item-1", &["op://V/item-1/a"])]));
            idx.upsert("worker", info(&[("item-2", &["op://V/item-2/b"])]));
            idx.delete("worker");
        }

        let db = Arc::new(Database::create(&path).unwrap());
        let idx = StackIndex::with_db(db).unwrap();
        let all = idx.all();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("web"));
    }

    #[test]
    fn test_corrupt_rows_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let db = Arc::new(Database::create(&path).unwrap());
        {
            let idx = StackIndex::with_db(Arc::clone(&db)).unwrap();
            idx.upsert("good", info(&[("item-1", &["op://V/item-1/a"])]));
        }
        // Plant a row that is not valid StackInfo JSON
        {
            let write_txn = db.begin_write().unwrap();
            {
                let mut table = write_txn.open_table(INDEX).unwrap();
                table.insert("bad", b"{not json".as_slice()).unwrap();
            }
            write_txn.commit().unwrap();
        }

        let idx = StackIndex::with_db(db).unwrap();
        let all = idx.all();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("good"));
    }
}
