//! Render-graph primitive API
//!
//! The render index is owned by the rendering backend. The sync layer only
//! inserts and removes entities through [`RenderIndex`]; dirty state lives
//! in the [`ChangeTracker`](super::ChangeTracker).

use crate::scene::EntityPath;
use std::collections::{BTreeMap, HashSet};

/// Category of render entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Renderable geometry
    Rprim,
    /// State entity (lights, materials)
    Sprim,
    /// Instancer shared by several occurrences
    Instancer,
}

/// An entity stored in the render graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEntity {
    /// Entity category
    pub kind: EntityKind,
    /// Backend type tag (e.g. `"mesh"`, `"sphereLight"`)
    pub type_tag: String,
}

/// Insertion/removal interface of an external render graph
pub trait RenderIndex {
    /// Whether the backend can represent entities with this tag
    fn is_type_supported(&self, kind: EntityKind, type_tag: &str) -> bool;

    /// Insert an entity. Returns false if the path is already occupied.
    fn insert_entity(&mut self, kind: EntityKind, type_tag: &str, path: &EntityPath) -> bool;

    /// Remove an entity. Returns false if nothing lived at `path`.
    fn remove_entity(&mut self, path: &EntityPath) -> bool;

    /// Look up an entity
    fn entity(&self, path: &EntityPath) -> Option<&RenderEntity>;

    /// All entity paths, sorted
    fn entity_paths(&self) -> Vec<EntityPath>;

    /// Number of entities
    fn entity_count(&self) -> usize;

    /// Whether an entity exists at `path`
    fn contains(&self, path: &EntityPath) -> bool {
        self.entity(path).is_some()
    }
}

/// Render graph kept in memory, for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryRenderIndex {
    entities: BTreeMap<EntityPath, RenderEntity>,
    supported: Option<HashSet<String>>,
}

impl MemoryRenderIndex {
    /// Render index that accepts every type tag
    pub fn new() -> Self {
        Self::default()
    }

    /// Render index that only accepts the listed type tags
    pub fn with_supported_types(tags: &[&str]) -> Self {
        Self {
            entities: BTreeMap::new(),
            supported: Some(tags.iter().map(|t| (*t).to_string()).collect()),
        }
    }
}

impl RenderIndex for MemoryRenderIndex {
    fn is_type_supported(&self, kind: EntityKind, type_tag: &str) -> bool {
        kind == EntityKind::Instancer
            || self
                .supported
                .as_ref()
                .map_or(true, |tags| tags.contains(type_tag))
    }

    fn insert_entity(&mut self, kind: EntityKind, type_tag: &str, path: &EntityPath) -> bool {
        if self.entities.contains_key(path) {
            return false;
        }
        self.entities.insert(
            path.clone(),
            RenderEntity {
                kind,
                type_tag: type_tag.to_string(),
            },
        );
        true
    }

    fn remove_entity(&mut self, path: &EntityPath) -> bool {
        self.entities.remove(path).is_some()
    }

    fn entity(&self, path: &EntityPath) -> Option<&RenderEntity> {
        self.entities.get(path)
    }

    fn entity_paths(&self) -> Vec<EntityPath> {
        self.entities.keys().cloned().collect()
    }

    fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut index = MemoryRenderIndex::new();
        let path = EntityPath::parse("/root/cube").unwrap();

        assert!(index.insert_entity(EntityKind::Rprim, "mesh", &path));
        assert!(!index.insert_entity(EntityKind::Rprim, "mesh", &path));
        assert_eq!(index.entity_count(), 1);
        assert_eq!(index.entity(&path).map(|e| e.type_tag.as_str()), Some("mesh"));

        assert!(index.remove_entity(&path));
        assert!(!index.remove_entity(&path));
        assert!(!index.contains(&path));
    }

    #[test]
    fn test_supported_types() {
        let index = MemoryRenderIndex::with_supported_types(&["mesh"]);
        assert!(index.is_type_supported(EntityKind::Rprim, "mesh"));
        assert!(!index.is_type_supported(EntityKind::Sprim, "rectLight"));
        assert!(index.is_type_supported(EntityKind::Instancer, "instancer"));
    }
}
