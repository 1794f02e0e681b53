//! Explicit registry of open stores.
//!
//! One registry is created at process start and handed to whoever needs a
//! store. It hands out one shared `SqliteStore` per database location and
//! drops them again on `close`/`close_all`.

use log::info;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::sqlite_store::SqliteStore;
use super::store::{StoreError, StoreResult};

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreLocation {
    /// Database file on disk.
    File(PathBuf),
    /// Named in-memory database; each name maps to its own database.
    Memory(String),
}

impl StoreLocation {
    /// Registry key for this location.
    pub fn key(&self) -> String {
        match self {
            Self::File(path) => format!("file:{}", path.display()),
            Self::Memory(name) => format!("memory:{}", name.trim()),
        }
    }

    fn open(&self) -> StoreResult<SqliteStore> {
        match self {
            Self::File(path) => SqliteStore::open(path),
            Self::Memory(_) => SqliteStore::open_in_memory(),
        }
    }
}

/// Registry of shared stores keyed by location.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<BTreeMap<String, Arc<SqliteStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store for `location`, opening it on first use.
    pub fn open(&self, location: &StoreLocation) -> StoreResult<Arc<SqliteStore>> {
        let key = location.key();
        let mut stores = self.stores.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(location.open()?);
        stores.insert(key.clone(), Arc::clone(&store));
        info!("event=store_open module=registry status=ok key={key}");
        Ok(store)
    }

    /// Returns an already open store.
    pub fn get(&self, location: &StoreLocation) -> StoreResult<Option<Arc<SqliteStore>>> {
        let stores = self.stores.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(stores.get(&location.key()).cloned())
    }

    /// Forgets one store. Outstanding handles stay valid until dropped.
    pub fn close(&self, location: &StoreLocation) -> StoreResult<bool> {
        let mut stores = self.stores.lock().map_err(|_| StoreError::LockPoisoned)?;
        let removed = stores.remove(&location.key()).is_some();
        if removed {
            info!(
                "event=store_close module=registry status=ok key={}",
                location.key()
            );
        }
        Ok(removed)
    }

    /// Forgets every store and returns how many were open.
    pub fn close_all(&self) -> StoreResult<usize> {
        let mut stores = self.stores.lock().map_err(|_| StoreError::LockPoisoned)?;
        let count = stores.len();
        stores.clear();
        info!("event=store_close_all module=registry status=ok count={count}");
        Ok(count)
    }

    /// Sorted keys of open stores.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let stores = self.stores.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(stores.keys().cloned().collect())
    }
}
