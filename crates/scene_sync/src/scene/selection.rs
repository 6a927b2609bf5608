//! Selection mapping
//!
//! Turns the host selection (which may name groups, instance occurrences
//! or individual shapes) into the set of render entities to highlight,
//! with per-entity instance index subsets.

use super::instancing::InstanceTracker;
use super::EntityPath;
use crate::host::{DagPath, HostScene};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Renderer-facing selection snapshot, built once per mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    highlights: Vec<(EntityPath, Vec<u32>)>,
}

impl SelectionState {
    fn build(entries: &BTreeMap<EntityPath, Option<BTreeSet<u32>>>) -> Self {
        let highlights = entries
            .iter()
            .map(|(path, indices)| {
                let indices = indices.iter().flatten().copied().collect();
                (path.clone(), indices)
            })
            .collect();
        Self { highlights }
    }

    /// Highlighted entities in path order. An empty index list means the
    /// whole entity.
    pub fn highlights(&self) -> &[(EntityPath, Vec<u32>)] {
        &self.highlights
    }
}

/// Deduplicated selection: entity path → optional instance index subset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    entries: BTreeMap<EntityPath, Option<BTreeSet<u32>>>,
    state: SelectionState,
}

impl SelectionResult {
    /// Selected entities and their index subsets
    pub fn entries(&self) -> &BTreeMap<EntityPath, Option<BTreeSet<u32>>> {
        &self.entries
    }

    /// Opaque state for the renderer
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Whether `path` is selected
    pub fn contains(&self, path: &EntityPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Selected instance indices of an instanced entity
    pub fn indices(&self, path: &EntityPath) -> Option<&BTreeSet<u32>> {
        self.entries.get(path)?.as_ref()
    }

    /// Number of selected entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is selected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Walks host selections into entity selections
pub struct SelectionMapper<'a> {
    host: &'a dyn HostScene,
    instances: &'a InstanceTracker,
}

impl<'a> SelectionMapper<'a> {
    /// Mapper resolving shapes through `instances`
    pub fn new(host: &'a dyn HostScene, instances: &'a InstanceTracker) -> Self {
        Self { host, instances }
    }

    /// Map an ordered host selection.
    ///
    /// A selected path is skipped when another selected path is its
    /// ancestor, so every subtree is walked at most once.
    pub fn map(&self, selection: &[DagPath]) -> SelectionResult {
        let mut entries: BTreeMap<EntityPath, Option<BTreeSet<u32>>> = BTreeMap::new();
        let mut visited = HashSet::new();

        for selected in selection {
            if selection.iter().any(|other| other.is_ancestor_of(selected)) {
                continue;
            }
            if !visited.insert(selected.clone()) {
                continue;
            }
            self.visit(selected, &mut entries);
        }

        let state = SelectionState::build(&entries);
        SelectionResult { entries, state }
    }

    fn visit(&self, root: &DagPath, entries: &mut BTreeMap<EntityPath, Option<BTreeSet<u32>>>) {
        let mut stack = vec![root.clone()];
        while let Some(path) = stack.pop() {
            let Some(node) = path.leaf() else { continue };
            if !self.host.is_valid(node) {
                continue;
            }
            if let Some((master, index)) = self.instances.resolve(node, &path) {
                match index {
                    Some(index) => {
                        entries
                            .entry(master)
                            .or_insert_with(|| Some(BTreeSet::new()))
                            .get_or_insert_with(BTreeSet::new)
                            .insert(index);
                    }
                    None => {
                        entries.insert(master, None);
                    }
                }
            }
            for child in self.host.children(node).into_iter().rev() {
                stack.push(path.child(child));
            }
        }
    }
}
