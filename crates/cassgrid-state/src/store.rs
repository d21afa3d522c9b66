//! Blob store — durable key/value persistence for framework state.
//!
//! Each logical store (`persisted` module) wraps one JSON blob under a
//! stable key. The backend contract is small: durable `store`, and `load`
//! with read-your-writes. The default backend is redb, either on disk or
//! in memory (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::Database;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::FRAMEWORK_STATE;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Durable key/value backend for framework blobs.
///
/// `store` must not return before the write is acknowledged; `load` must
/// observe the most recent acknowledged `store` for the same key.
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>>;
    fn store(&self, key: &str, value: &[u8]) -> StateResult<()>;
}

/// redb-backed blob store.
#[derive(Clone)]
pub struct RedbBlobStore {
    db: Arc<Database>,
}

impl RedbBlobStore {
    /// Open (or create) a persistent blob store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "blob store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory blob store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory blob store opened");
        Ok(store)
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_table(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(FRAMEWORK_STATE).map_err(map_err!(Backend))?;
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }
}

impl BlobStore for RedbBlobStore {
    fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(FRAMEWORK_STATE).map_err(map_err!(Backend))?;
        match table.get(key).map_err(map_err!(Backend))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(FRAMEWORK_STATE).map_err(map_err!(Backend))?;
            table.insert(key, value).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }
}
