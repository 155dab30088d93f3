//! Shared tables keyed by id
//!
//! A registry opens each table at most once and hands out `Arc`s. Tables
//! are immutable, so readers never take a lock after the `Arc` is cloned.
//!
//! Each id owns a slot with its own mutex. The map lock is only held long
//! enough to find or create a slot, so opening one table never blocks
//! lookups of the others.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use wordvec_core::{TableError, TableOptions, VectorTable};

/// `None` until the first successful open
type Slot = Arc<Mutex<Option<Arc<VectorTable>>>>;

pub struct TableRegistry {
    options: TableOptions,
    tables: RwLock<HashMap<String, Slot>>,
}

fn loaded(slot: &Slot) -> Option<Arc<VectorTable>> {
    // A held slot is mid-open and has nothing to hand out yet
    slot.try_lock()?.clone()
}

impl TableRegistry {
    pub fn new(options: TableOptions) -> Self {
        Self {
            options,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Options used by [`get_or_open`](Self::get_or_open)
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    fn slot(&self, id: &str) -> Slot {
        if let Some(slot) = self.tables.read().get(id) {
            return Arc::clone(slot);
        }
        Arc::clone(self.tables.write().entry(id.to_string()).or_default())
    }

    /// Loaded table for `id`. Never waits on an open in progress.
    pub fn get(&self, id: &str) -> Option<Arc<VectorTable>> {
        let slot = self.tables.read().get(id).cloned()?;
        loaded(&slot)
    }

    /// Table registered under `id`, opening `source` on first use
    pub fn get_or_open(&self, id: &str, source: impl AsRef<Path>) -> Result<Arc<VectorTable>, TableError> {
        self.get_or_open_with(id, source, &self.options)
    }

    /// Like [`get_or_open`](Self::get_or_open) with explicit options.
    pub fn get_or_open_with(
        &self,
        id: &str,
        source: impl AsRef<Path>,
        options: &TableOptions,
    ) -> Result<Arc<VectorTable>, TableError> {
        if let Some(table) = self.get(id) {
            return Ok(table);
        }
        self.get_or_insert_with(id, || VectorTable::open(source, options))
    }

    /// Table registered under `id`, or the result of `open`.
    ///
    /// Concurrent callers for the same id wait for a single call to `open`.
    /// A failed open registers nothing and the next caller tries again.
    pub fn get_or_insert_with<F>(&self, id: &str, open: F) -> Result<Arc<VectorTable>, TableError>
    where
        F: FnOnce() -> Result<VectorTable, TableError>,
    {
        let slot = self.slot(id);
        let mut guard = slot.lock();
        if let Some(table) = guard.as_ref() {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(open()?);
        tracing::debug!("Registered table {:?} ({} keys)", id, table.len());
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Register an already built table, returning the one it replaces
    pub fn insert(&self, id: impl Into<String>, table: Arc<VectorTable>) -> Option<Arc<VectorTable>> {
        let id = id.into();
        let slot = self.slot(&id);
        let previous = slot.lock().replace(table);
        previous
    }

    /// Existing `Arc`s stay valid after removal
    pub fn remove(&self, id: &str) -> Option<Arc<VectorTable>> {
        let slot = self.tables.write().remove(id)?;
        let table = slot.lock().take();
        table
    }

    pub fn clear(&self) {
        self.tables.write().clear();
    }

    pub fn len(&self) -> usize {
        self.tables.read().values().filter(|slot| loaded(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tables
            .read()
            .iter()
            .filter(|(_, slot)| loaded(slot).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new(TableOptions::default())
    }
}
