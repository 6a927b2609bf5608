//! Per-entity dirty-bit tracker
//!
//! Owned by the sync context. Bits only ever accumulate from the sync side;
//! the render backend clears them after consuming a frame.

use super::DirtyBits;
use crate::scene::EntityPath;
use std::collections::{BTreeMap, HashMap};

/// Dirty-bit bookkeeping for every tracked render entity
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entities: BTreeMap<EntityPath, DirtyBits>,
    collections: HashMap<String, u64>,
}

impl ChangeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new entity with its initial bits
    pub fn track(&mut self, path: &EntityPath, initial: DirtyBits) {
        self.entities.insert(path.clone(), initial);
    }

    /// Stop tracking an entity
    pub fn untrack(&mut self, path: &EntityPath) -> bool {
        self.entities.remove(path).is_some()
    }

    /// OR `bits` into an entity's mask. Untracked paths are ignored.
    pub fn mark_dirty(&mut self, path: &EntityPath, bits: DirtyBits) -> bool {
        match self.entities.get_mut(path) {
            Some(existing) => {
                *existing |= bits;
                true
            }
            None => false,
        }
    }

    /// Current mask of an entity
    pub fn dirty_bits(&self, path: &EntityPath) -> Option<DirtyBits> {
        self.entities.get(path).copied()
    }

    /// Whether the entity is tracked and has any bit set
    pub fn is_dirty(&self, path: &EntityPath) -> bool {
        self.dirty_bits(path).is_some_and(|bits| !bits.is_empty())
    }

    /// Backend acknowledgement: clear an entity's mask
    pub fn mark_clean(&mut self, path: &EntityPath) {
        if let Some(bits) = self.entities.get_mut(path) {
            *bits = DirtyBits::CLEAN;
        }
    }

    /// Backend acknowledgement: clear every mask
    pub fn mark_all_clean(&mut self) {
        for bits in self.entities.values_mut() {
            *bits = DirtyBits::CLEAN;
        }
    }

    /// Tracked entities with any bit set, in path order
    pub fn dirty_entities(&self) -> impl Iterator<Item = (&EntityPath, DirtyBits)> {
        self.entities
            .iter()
            .filter(|(_, bits)| !bits.is_empty())
            .map(|(path, bits)| (path, *bits))
    }

    /// Register a named dirty-trackable collection
    pub fn add_collection(&mut self, name: &str) {
        self.collections.entry(name.to_string()).or_insert(1);
    }

    /// Bump a collection's version, registering it if needed
    pub fn mark_collection_dirty(&mut self, name: &str) {
        *self.collections.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Current version of a collection
    pub fn collection_version(&self, name: &str) -> Option<u64> {
        self.collections.get(name).copied()
    }
}
