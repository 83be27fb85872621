//! # redb-backed Durable Store
//!
//! Keeps the durable snapshot in a redb database file so it survives
//! process restarts. One table, one key; a write replaces the value inside
//! a single transaction, so a crash mid-save leaves the previous snapshot.

use super::DurableStore;
use crate::FlexError;
use crate::primitives::STATE_STORAGE_KEY;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::{Path, PathBuf};

/// Table for snapshots: storage key -> snapshot JSON
const SNAPSHOTS: TableDefinition<&str, &str> = TableDefinition::new("snapshots");

fn io(e: impl std::fmt::Display) -> FlexError {
    FlexError::IoError(e.to_string())
}

/// A durable store backed by a redb file.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlexError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(io)?;

        // Create the table up front so reads never see a missing table.
        let write_txn = db.begin_write().map_err(io)?;
        let _ = write_txn.open_table(SNAPSHOTS).map_err(io)?;
        write_txn.commit().map_err(io)?;

        tracing::debug!(path = %path.display(), "Opened durable store");
        Ok(Self { db, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for RedbStore {
    fn load(&self) -> Result<Option<String>, FlexError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(SNAPSHOTS).map_err(io)?;
        Ok(table
            .get(STATE_STORAGE_KEY)
            .map_err(io)?
            .map(|v| v.value().to_string()))
    }

    fn store(&mut self, text: &str) -> Result<(), FlexError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(SNAPSHOTS).map_err(io)?;
            table.insert(STATE_STORAGE_KEY, text).map_err(io)?;
        }
        write_txn.commit().map_err(io)
    }

    fn clear(&mut self) -> Result<(), FlexError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(SNAPSHOTS).map_err(io)?;
            table.remove(STATE_STORAGE_KEY).map_err(io)?;
        }
        write_txn.commit().map_err(io)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn value_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("state.redb");
        {
            let mut store = RedbStore::open(&path).expect("open");
            assert_eq!(store.load().expect("load"), None);
            store.store("{\"version\":4}").expect("store");
        }
        let store = RedbStore::open(&path).expect("reopen");
        assert_eq!(store.load().expect("load").as_deref(), Some("{\"version\":4}"));
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn clear_removes_value() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("s.redb")).expect("open");
        store.store("x").expect("store");
        store.clear().expect("clear");
        store.clear().expect("clear again");
        assert_eq!(store.load().expect("load"), None);
    }
}
