//! Change sets
//!
//! Records, per key, what the last mutating call did to it. A key is in at
//! most one of `added`, `updated` or `removed`; keys in none are untouched.

use entstack_types::{ComponentId, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet<K: Ord> {
    pub added: BTreeSet<K>,
    pub updated: BTreeSet<K>,
    pub removed: BTreeSet<K>,
}

impl<K: Ord> Default for ChangeSet<K> {
    fn default() -> Self {
        Self {
            added: BTreeSet::new(),
            updated: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Copy> ChangeSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an addition
    ///
    /// A key removed earlier in the same change set comes back as an update.
    pub fn add(&mut self, key: K) {
        if self.removed.remove(&key) {
            self.updated.insert(key);
        } else if !self.updated.contains(&key) {
            self.added.insert(key);
        }
    }

    /// Record an update; a key added in this change set stays added
    pub fn update(&mut self, key: K) {
        if self.added.contains(&key) || self.removed.contains(&key) {
            return;
        }
        self.updated.insert(key);
    }

    /// Record a removal
    ///
    /// A key added in this same change set was transient and simply drops out.
    pub fn remove(&mut self, key: K) {
        if self.added.remove(&key) {
            return;
        }
        self.updated.remove(&key);
        self.removed.insert(key);
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.removed.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn is_added(&self, key: &K) -> bool {
        self.added.contains(key)
    }

    pub fn is_updated(&self, key: &K) -> bool {
        self.updated.contains(key)
    }

    pub fn is_removed(&self, key: &K) -> bool {
        self.removed.contains(key)
    }
}

/// The pair of change sets a store keeps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSets {
    pub entities: ChangeSet<EntityId>,
    pub components: ChangeSet<ComponentId>,
}

impl ChangeSets {
    pub fn clear(&mut self) {
        self.entities.clear();
        self.components.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.components.is_empty()
    }
}
