//! Resource Table - key to entry mapping for one asset type
//!
//! The table lock covers lookup and insert only. Lock order is always
//! table first, then entry.

use crate::asset::TypeTag;
use crate::entry::{LoadState, LoadTicket, ResourceEntry};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of looking up a key for a request
pub(crate) struct Acquired {
    pub entry: Arc<ResourceEntry>,
    /// Present if this caller moved the entry into `Loading` and must
    /// schedule the load
    pub ticket: Option<LoadTicket>,
    pub inserted: bool,
}

/// Concurrent mapping from key to entry, scoped to one asset type
pub struct ResourceTable {
    tag: TypeTag,
    entries: RwLock<HashMap<String, Arc<ResourceEntry>>>,
}

impl ResourceTable {
    pub fn new(tag: TypeTag) -> Self {
        Self {
            tag,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Asset type stored in this table
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Find or create the entry for `key`.
    ///
    /// A new entry is inserted and moved to `Loading` inside the same write
    /// critical section, so concurrent first requests yield one ticket. An
    /// existing `Unloaded` entry is re-armed; any other state is returned as is.
    pub(crate) fn acquire(&self, key: &str) -> Acquired {
        if let Some(entry) = self.entries.read().get(key) {
            return Acquired {
                ticket: entry.begin_load_if_unloaded(),
                entry: entry.clone(),
                inserted: false,
            };
        }

        let mut entries = self.entries.write();
        match entries.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                let entry = slot.get().clone();
                Acquired {
                    ticket: entry.begin_load_if_unloaded(),
                    entry,
                    inserted: false,
                }
            }
            Entry::Vacant(slot) => {
                let entry = Arc::new(ResourceEntry::new(key, self.tag));
                let ticket = entry.begin_load();
                slot.insert(entry.clone());
                Acquired {
                    entry,
                    ticket,
                    inserted: true,
                }
            }
        }
    }

    /// Put a detached entry back under its key if the slot is free
    pub(crate) fn reinstate(&self, entry: &Arc<ResourceEntry>) -> bool {
        let mut entries = self.entries.write();
        match entries.entry(entry.key().to_string()) {
            Entry::Occupied(slot) => Arc::ptr_eq(slot.get(), entry),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                true
            }
        }
    }

    /// Look up an entry without touching its state
    pub fn get(&self, key: &str) -> Option<Arc<ResourceEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Check if `key` has an entry
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Remove an entry regardless of its state
    pub fn remove(&self, key: &str) -> Option<Arc<ResourceEntry>> {
        self.entries.write().remove(key)
    }

    /// Copy of all entries, taken under the read lock
    pub fn snapshot(&self) -> Vec<Arc<ResourceEntry>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove `Unloaded` entries that only the table references.
    ///
    /// Returns the removed keys.
    pub fn purge_unreferenced(&self) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.write().retain(|key, entry| {
            let unused = Arc::strong_count(entry) == 1 && entry.state() == LoadState::Unloaded;
            if unused {
                removed.push(key.clone());
            }
            !unused
        });
        removed
    }
}

impl core::fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceTable")
            .field("tag", &self.tag)
            .field("len", &self.len())
            .finish()
    }
}
