//! The identity-keyed instance cache.
//!
//! Two views over the same entries: an append-ordered sequence for full
//! iteration and an index from key to position for point lookup. Removed
//! entries move to a pending-removal list until the removal is saved.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use stowage_foundation::Value;

use crate::declare::Handle;

/// One cached instance.
pub struct CachedObject<T> {
    key: Value,
    handle: Handle<T>,
    dirty: bool,
}

impl<T> CachedObject<T> {
    /// Storage-normalized identity.
    #[must_use]
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Shared handle to the instance.
    #[must_use]
    pub fn handle(&self) -> &Handle<T> {
        &self.handle
    }

    /// Returns true if the instance changed since the last save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl<T> fmt::Debug for CachedObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedObject")
            .field("key", &self.key)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Cached instances of one type.
pub struct Cache<T> {
    entries: Vec<CachedObject<T>>,
    index: HashMap<Value, usize>,
    removed: Vec<CachedObject<T>>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Cache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no instance is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `key` is live.
    #[must_use]
    pub fn contains(&self, key: &Value) -> bool {
        self.index.contains_key(key)
    }

    /// The live entry for `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&CachedObject<T>> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CachedObject<T>> {
        self.entries.iter()
    }

    /// Entries removed since the last save.
    #[must_use]
    pub fn removed(&self) -> &[CachedObject<T>] {
        &self.removed
    }

    /// Inserts or replaces the entry for `key`. A replaced entry keeps its
    /// position. A pending removal of the same key is cancelled.
    pub fn insert(&mut self, key: Value, handle: Handle<T>, dirty: bool) {
        self.removed.retain(|r| r.key != key);
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.handle = handle;
                entry.dirty |= dirty;
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(CachedObject { key, handle, dirty });
            }
        }
    }

    /// Flags the entry for `key` as changed.
    pub fn mark_dirty(&mut self, key: &Value) -> bool {
        match self.index.get(key) {
            Some(&i) => {
                self.entries[i].dirty = true;
                true
            }
            None => false,
        }
    }

    /// Moves the entry for `key` to the pending-removal list.
    pub fn remove(&mut self, key: &Value) -> Option<Handle<T>> {
        let position = self.index.remove(key)?;
        let entry = self.entries.remove(position);
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }
        let handle = Rc::clone(&entry.handle);
        self.removed.push(entry);
        Some(handle)
    }

    /// Keys of the dirty live entries.
    #[must_use]
    pub fn dirty_keys(&self) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| e.dirty)
            .map(|e| e.key.clone())
            .collect()
    }

    /// Keys of the pending removals.
    #[must_use]
    pub fn removed_keys(&self) -> Vec<Value> {
        self.removed.iter().map(|e| e.key.clone()).collect()
    }

    /// Forgets pending removals and marks every entry clean.
    pub fn settle(&mut self) {
        self.removed.clear();
        for entry in &mut self.entries {
            entry.dirty = false;
        }
    }

    /// Drops every entry and pending removal.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.removed.clear();
    }

    /// Largest integer key, live or pending removal.
    #[must_use]
    pub fn max_integer_key(&self) -> Option<i64> {
        self.entries
            .iter()
            .chain(&self.removed)
            .filter_map(|e| e.key.as_integer())
            .max()
    }

    /// Returns true if the sequence and the index agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.entries.len() == self.index.len()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, e)| self.index.get(&e.key) == Some(&i))
            && self.removed.iter().all(|r| !self.index.contains_key(&r.key))
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries)
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}
