//! Cache of linked classpaths.
//!
//! Installed code never changes, so a classpath links to the same classes
//! every time. The cache is keyed by the list of classpaths as given by the
//! request and holds at most `capacity` entries; when full it is emptied
//! before inserting. A capacity of zero disables it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::trace;

use ledger_sandbox_store::Store;
use ledger_sandbox_types::Classpath;

use crate::sandbox::loader::{ClasspathLimits, LoadedClasspath};

/// Thread-safe cache of [`LoadedClasspath`]s.
#[derive(Debug)]
pub struct LoaderCache {
    capacity: usize,
    entries: RwLock<HashMap<Vec<Classpath>, Arc<LoadedClasspath>>>,
}

impl LoaderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The linked form of `classpaths`, from the cache or freshly linked.
    /// Failed links are not cached.
    pub fn get_or_link(
        &self,
        store: &dyn Store,
        classpaths: &[Classpath],
        limits: &ClasspathLimits,
    ) -> Result<Arc<LoadedClasspath>> {
        if let Some(loaded) = self.entries.read().get(classpaths) {
            trace!(classpaths = classpaths.len(), "loader cache hit");
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(LoadedClasspath::link(store, classpaths, limits)?);
        if self.capacity > 0 {
            let mut entries = self.entries.write();
            if entries.len() >= self.capacity {
                entries.clear();
            }
            entries.insert(classpaths.to_vec(), Arc::clone(&loaded));
        }
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Needed when a response holding code is replaced.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
