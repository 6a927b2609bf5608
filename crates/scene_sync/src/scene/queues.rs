//! Deferred work queues
//!
//! Event callbacks can fire mid-transaction, while the host is still
//! building or tearing down nodes. They therefore only record intent here;
//! the sync tick drains everything in a fixed order once per frame.
//!
//! - **recreate**: path → replacement node, last write wins
//! - **rebuild**: path → [`RebuildFlags`], OR-accumulated
//! - **insertions**: nodes that were added or re-parented
//! - **dirty**: path → [`DirtyBits`], OR-accumulated
//! - **material tags**: materials whose classification changed

use super::EntityPath;
use crate::foundation::collections::{or_insert_bits, IndexMap, IndexSet};
use crate::host::NodeHandle;
use crate::render::{DirtyBits, RebuildFlags};

/// Pending work between two ticks
#[derive(Debug, Default)]
pub struct DeferredQueues {
    recreate: IndexMap<EntityPath, NodeHandle>,
    rebuild: IndexMap<EntityPath, RebuildFlags>,
    insertions: IndexSet<NodeHandle>,
    dirty: IndexMap<EntityPath, DirtyBits>,
    material_tags: IndexSet<EntityPath>,
}

impl DeferredQueues {
    /// Create empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the adapter at `path` be rebuilt from `node`.
    ///
    /// A null `node` requests plain removal. A later request for the same
    /// path replaces the earlier one.
    pub fn enqueue_recreate(&mut self, path: EntityPath, node: NodeHandle) {
        log::trace!("queue recreate {path}");
        self.recreate.insert(path, node);
    }

    /// Request a partial rebuild; flags for the same path are merged
    pub fn enqueue_rebuild(&mut self, path: EntityPath, flags: RebuildFlags) {
        log::trace!("queue rebuild {path} {flags:?}");
        or_insert_bits(&mut self.rebuild, path, flags);
    }

    /// Request that `node` (and its subtree) be inserted or reconciled
    pub fn enqueue_insertion(&mut self, node: NodeHandle) {
        self.insertions.insert(node);
    }

    /// Accumulate dirty bits for the entity at `path`
    pub fn enqueue_dirty(&mut self, path: EntityPath, bits: DirtyBits) {
        if !bits.is_empty() {
            or_insert_bits(&mut self.dirty, path, bits);
        }
    }

    /// Record that a material's classification changed
    pub fn enqueue_material_tag(&mut self, material: EntityPath) {
        self.material_tags.insert(material);
    }

    /// Pending rebuild flags for `path`, if any
    pub fn pending_rebuild(&self, path: &EntityPath) -> Option<RebuildFlags> {
        self.rebuild.get(path).copied()
    }

    /// Pending dirty bits for `path`, if any
    pub fn pending_dirty(&self, path: &EntityPath) -> Option<DirtyBits> {
        self.dirty.get(path).copied()
    }

    /// Take the pending insertions
    pub fn take_insertions(&mut self) -> IndexSet<NodeHandle> {
        std::mem::take(&mut self.insertions)
    }

    /// Take the pending recreates
    pub fn take_recreate(&mut self) -> IndexMap<EntityPath, NodeHandle> {
        std::mem::take(&mut self.recreate)
    }

    /// Take the pending rebuilds
    pub fn take_rebuild(&mut self) -> IndexMap<EntityPath, RebuildFlags> {
        std::mem::take(&mut self.rebuild)
    }

    /// Take the pending dirty marks
    pub fn take_dirty(&mut self) -> IndexMap<EntityPath, DirtyBits> {
        std::mem::take(&mut self.dirty)
    }

    /// Take the pending material classification changes
    pub fn take_material_tags(&mut self) -> IndexSet<EntityPath> {
        std::mem::take(&mut self.material_tags)
    }

    /// Whether nothing at all is pending
    pub fn is_empty(&self) -> bool {
        self.recreate.is_empty()
            && self.rebuild.is_empty()
            && self.insertions.is_empty()
            && self.dirty.is_empty()
            && self.material_tags.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.recreate.clear();
        self.rebuild.clear();
        self.insertions.clear();
        self.dirty.clear();
        self.material_tags.clear();
    }
}
