//! Instance tracking
//!
//! A shape node reachable through several DAG occurrences is synced once,
//! as a master entity plus an instancer. The tracker remembers, per shape
//! node, where its master lives and which occurrence owns which instance
//! index. An [`InstanceRecord`] only exists while there are at least two
//! occurrences.

use super::EntityPath;
use crate::host::{DagPath, NodeHandle};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Master entity plus the occurrences sharing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    master: EntityPath,
    occurrences: BTreeMap<u32, DagPath>,
}

impl InstanceRecord {
    /// Entity path of the master adapter
    pub fn master(&self) -> &EntityPath {
        &self.master
    }

    /// Instance indices in ascending order
    pub fn indices(&self) -> BTreeSet<u32> {
        self.occurrences.keys().copied().collect()
    }

    /// Occurrences keyed by instance index
    pub fn occurrences(&self) -> &BTreeMap<u32, DagPath> {
        &self.occurrences
    }

    /// Index assigned to one occurrence
    pub fn index_of(&self, dag: &DagPath) -> Option<u32> {
        self.occurrences
            .iter()
            .find(|(_, path)| *path == dag)
            .map(|(index, _)| *index)
    }

    /// Number of occurrences
    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    /// Whether the record has no occurrences
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    fn master_occurrence(&self) -> Option<&DagPath> {
        self.occurrences.get(&0)
    }

    fn next_free_index(&self) -> u32 {
        (0..).find(|i| !self.occurrences.contains_key(i)).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct SingleEntry {
    master: EntityPath,
    occurrence: DagPath,
}

/// Outcome of reconciling a shape's tracked occurrences with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccurrenceChange {
    /// Nothing changed (or the node is not tracked)
    Unchanged,
    /// Occurrence count reached two; a record with indices {0, 1, ..} exists
    Promoted {
        /// Master entity path
        master: EntityPath,
    },
    /// The record gained and/or lost occurrences but stays instanced
    Reindexed {
        /// Master entity path
        master: EntityPath,
        /// Newly assigned indices
        added: Vec<u32>,
        /// Released indices
        removed: Vec<u32>,
    },
    /// Only one occurrence remains; the master must collapse back
    Demoted {
        /// Master entity path
        master: EntityPath,
    },
    /// The occurrence the master was derived from no longer exists
    MasterLost {
        /// Master entity path
        master: EntityPath,
    },
}

/// Per-shape occurrence bookkeeping
#[derive(Debug)]
pub struct InstanceTracker {
    singles: HashMap<NodeHandle, SingleEntry>,
    records: HashMap<NodeHandle, InstanceRecord>,
    masters: HashMap<EntityPath, NodeHandle>,
    enabled: bool,
}

impl Default for InstanceTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InstanceTracker {
    /// Create a tracker; when `enabled` is false extra occurrences are ignored
    pub fn new(enabled: bool) -> Self {
        Self {
            singles: HashMap::new(),
            records: HashMap::new(),
            masters: HashMap::new(),
            enabled,
        }
    }

    /// Start tracking a freshly synced shape at its first occurrence
    pub fn track(&mut self, node: NodeHandle, master: EntityPath, occurrence: DagPath) {
        if self.is_tracked(node) {
            return;
        }
        self.masters.insert(master.clone(), node);
        self.singles.insert(node, SingleEntry { master, occurrence });
    }

    /// Whether `node` has a synced master
    pub fn is_tracked(&self, node: NodeHandle) -> bool {
        self.singles.contains_key(&node) || self.records.contains_key(&node)
    }

    /// Instance record of the master at `master`
    pub fn record_for_master(&self, master: &EntityPath) -> Option<&InstanceRecord> {
        self.records.get(self.masters.get(master)?)
    }

    /// Instance record of a node
    pub fn record_for(&self, node: NodeHandle) -> Option<&InstanceRecord> {
        self.records.get(&node)
    }

    /// Number of live instance records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Map one occurrence of `node` to its master path and instance index.
    ///
    /// Non-instanced masters resolve with no index. Occurrences that are not
    /// tracked (e.g. with instancing disabled) resolve to `None`.
    pub fn resolve(
        &self,
        node: NodeHandle,
        occurrence: &DagPath,
    ) -> Option<(EntityPath, Option<u32>)> {
        if let Some(single) = self.singles.get(&node) {
            return (single.occurrence == *occurrence).then(|| (single.master.clone(), None));
        }
        let record = self.records.get(&node)?;
        let index = record.index_of(occurrence)?;
        Some((record.master.clone(), Some(index)))
    }

    /// Compare tracked occurrences of `node` against the live ones
    pub fn reconcile(&mut self, node: NodeHandle, live: &[DagPath]) -> OccurrenceChange {
        if let Some(single) = self.singles.get(&node) {
            if !live.contains(&single.occurrence) {
                return OccurrenceChange::MasterLost {
                    master: single.master.clone(),
                };
            }
            let extras: Vec<&DagPath> = live.iter().filter(|p| **p != single.occurrence).collect();
            if extras.is_empty() || !self.enabled {
                return OccurrenceChange::Unchanged;
            }

            let Some(single) = self.singles.remove(&node) else {
                return OccurrenceChange::Unchanged;
            };
            let mut occurrences = BTreeMap::new();
            occurrences.insert(0, single.occurrence);
            for (index, extra) in (1..).zip(extras) {
                occurrences.insert(index, extra.clone());
            }
            let master = single.master;
            self.records.insert(
                node,
                InstanceRecord {
                    master: master.clone(),
                    occurrences,
                },
            );
            return OccurrenceChange::Promoted { master };
        }

        let Some(record) = self.records.get_mut(&node) else {
            return OccurrenceChange::Unchanged;
        };
        let master = record.master.clone();
        if record.master_occurrence().map_or(true, |m| !live.contains(m)) {
            return OccurrenceChange::MasterLost { master };
        }

        let removed: Vec<u32> = record
            .occurrences
            .iter()
            .filter(|(_, path)| !live.contains(path))
            .map(|(index, _)| *index)
            .collect();
        for index in &removed {
            record.occurrences.remove(index);
        }

        let mut added = Vec::new();
        for path in live {
            if record.index_of(path).is_none() {
                let index = record.next_free_index();
                record.occurrences.insert(index, path.clone());
                added.push(index);
            }
        }

        if record.len() <= 1 {
            let occurrence = record.occurrences.remove(&0);
            self.records.remove(&node);
            if let Some(occurrence) = occurrence {
                self.singles.insert(
                    node,
                    SingleEntry {
                        master: master.clone(),
                        occurrence,
                    },
                );
            }
            return OccurrenceChange::Demoted { master };
        }

        if added.is_empty() && removed.is_empty() {
            OccurrenceChange::Unchanged
        } else {
            OccurrenceChange::Reindexed {
                master,
                added,
                removed,
            }
        }
    }

    /// Forget everything about the master at `master`
    pub fn forget_master(&mut self, master: &EntityPath) -> bool {
        let Some(node) = self.masters.remove(master) else {
            return false;
        };
        self.singles.remove(&node);
        self.records.remove(&node);
        true
    }
}
