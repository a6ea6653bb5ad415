//! Name to path lookup over committed pool entries.

use camino::Utf8PathBuf;
use std::sync::Arc;

use crate::pool::{PoolEntry, PoolStore};
use crate::PoolResult;

/// Read-only view of the pool: resolving a name only refreshes its access time
#[derive(Debug, Clone)]
pub struct PathResolver {
    store: Arc<PoolStore>,
}

impl PathResolver {
    pub fn new(store: Arc<PoolStore>) -> Self {
        Self { store }
    }

    /// Path of the verified blob for `name`, or `NotReady`
    pub fn get_path(&self, name: &str) -> PoolResult<Utf8PathBuf> {
        Ok(self.store.resolve(name)?.path)
    }

    pub fn get_entry(&self, name: &str) -> PoolResult<PoolEntry> {
        self.store.resolve(name)
    }
}
