//! Identifier map: path or native id → [`ObjectId`].
//!
//! Populated while objects are built, then frozen. Resolution only ever sees the frozen
//! [`IdentifierMap`], so no edge can be resolved against a partially built map.

use std::collections::{HashMap, HashSet};
use storagegraph_model::ObjectId;

#[derive(Debug, Default)]
pub struct IdentifierMapBuilder {
    entries: HashMap<String, ObjectId>,
    ambiguous: HashSet<String>,
}

impl IdentifierMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key → id`. The first insertion wins; a later, different id for the same key
    /// marks the key ambiguous and returns `false`.
    pub fn observe(&mut self, key: impl Into<String>, id: ObjectId) -> bool {
        let key = key.into();
        match self.entries.get(&key) {
            None => {
                self.entries.insert(key, id);
                true
            }
            Some(existing) if *existing == id => true,
            Some(_) => {
                self.ambiguous.insert(key);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn freeze(self) -> IdentifierMap {
        IdentifierMap {
            entries: self.entries,
            ambiguous: self.ambiguous,
        }
    }
}

/// Read-only lookup table used during edge resolution.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    entries: HashMap<String, ObjectId>,
    ambiguous: HashSet<String>,
}

impl IdentifierMap {
    pub fn get(&self, key: &str) -> Option<ObjectId> {
        self.entries.get(key).copied()
    }

    /// Whether more than one object claimed `key`.
    pub fn is_ambiguous(&self, key: &str) -> bool {
        self.ambiguous.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
