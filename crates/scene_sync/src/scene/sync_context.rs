//! Synchronisation context
//!
//! Owns every adapter (path-keyed), the deferred work queues and the
//! services adapters call back into. Host notifications only enqueue;
//! all mutation of adapters and the render graph happens in [`SyncContext::tick`].
//!
//! ```text
//! SceneEvent ──notify──> DeferredQueues
//!                             │
//!          tick: recreate → insertions → recreate → rebuild → dirty → material fan-out
//!                             │
//!                   adapters + RenderIndex + ChangeTracker
//! ```

use super::instancing::{InstanceTracker, OccurrenceChange};
use super::queues::DeferredQueues;
use super::selection::{SelectionMapper, SelectionResult};
use super::{EntityPath, SyncError};
use crate::adapter::{Adapter, AdapterKind, AdapterRegistry, AdapterSeed};
use crate::config::SyncConfig;
use crate::events::{CallbackAction, EventHub, SceneEvent, SceneEventKind};
use crate::host::{AttrValue, DagPath, HostScene, NodeHandle};
use crate::render::{ChangeTracker, DirtyBits, EntityKind, RebuildFlags, RenderIndex};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Per-frame input to [`SyncContext::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame number
    pub frame: u64,
}

impl FrameContext {
    /// Context for frame `frame`
    pub fn new(frame: u64) -> Self {
        Self { frame }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frame the tick ran for
    pub frame: u64,
    /// Adapters created from insertion notifications
    pub inserted: usize,
    /// Adapters destroyed and rebuilt from their node
    pub recreated: usize,
    /// Adapters destroyed without replacement
    pub removed: usize,
    /// Rebuilds that re-ran callback installation
    pub callback_rebuilds: usize,
    /// Rebuilds that removed and repopulated render entities
    pub prim_rebuilds: usize,
    /// Rebuild entries discarded because the path was recreated
    pub subsumed: usize,
    /// Requests dropped because their node was gone
    pub dropped_stale: usize,
    /// Adapters that received dirty bits
    pub dirtied: usize,
    /// Entities re-dirtied by material tag changes
    pub material_fanout: usize,
}

impl TickReport {
    /// Whether the tick found nothing to do
    pub fn is_idle(&self) -> bool {
        *self == Self {
            frame: self.frame,
            ..Self::default()
        }
    }
}

/// Render-graph access lent to adapters during lifecycle calls
pub struct SyncServices {
    render_index: Box<dyn RenderIndex>,
    change_tracker: ChangeTracker,
    hub: EventHub,
    instances: InstanceTracker,
    prefix: EntityPath,
    material_scope: String,
}

impl SyncServices {
    /// Services over `render_index`, configured by `config`
    pub fn new(render_index: Box<dyn RenderIndex>, config: &SyncConfig) -> Self {
        let prefix = if config.path_prefix.is_empty() {
            EntityPath::root()
        } else {
            EntityPath::parse(&config.path_prefix).unwrap_or_else(|err| {
                warn!("{err}, using the root prefix");
                EntityPath::root()
            })
        };
        Self {
            render_index,
            change_tracker: ChangeTracker::new(),
            hub: EventHub::new(),
            instances: InstanceTracker::new(config.enable_instancing),
            prefix,
            material_scope: config.material_scope.clone(),
        }
    }

    /// Insert a render entity and start tracking it with `initial` bits
    pub fn insert_entity(
        &mut self,
        kind: EntityKind,
        type_tag: &str,
        path: &EntityPath,
        initial: DirtyBits,
    ) -> bool {
        if !self.render_index.insert_entity(kind, type_tag, path) {
            warn!("Render index rejected {type_tag} entity at {path}");
            return false;
        }
        self.change_tracker.track(path, initial);
        debug!("Inserted {type_tag} entity {path}");
        true
    }

    /// Remove a render entity and its dirty state
    pub fn remove_entity(&mut self, path: &EntityPath) -> bool {
        self.change_tracker.untrack(path);
        let removed = self.render_index.remove_entity(path);
        if removed {
            debug!("Removed entity {path}");
        }
        removed
    }

    /// OR `bits` into an entity's dirty state
    pub fn mark_dirty(&mut self, path: &EntityPath, bits: DirtyBits) -> bool {
        self.change_tracker.mark_dirty(path, bits)
    }

    /// The render graph
    pub fn render_index(&self) -> &dyn RenderIndex {
        &*self.render_index
    }

    /// Per-entity dirty state
    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.change_tracker
    }

    /// Subscription table
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Subscription table, mutably
    pub fn hub_mut(&mut self) -> &mut EventHub {
        &mut self.hub
    }

    /// Instance bookkeeping
    pub fn instances(&self) -> &InstanceTracker {
        &self.instances
    }

    /// Prefix of every derived entity path
    pub fn prefix(&self) -> &EntityPath {
        &self.prefix
    }

    /// Entity path of one DAG occurrence
    pub fn dag_entity_path(&self, host: &dyn HostScene, dag: &DagPath) -> Option<EntityPath> {
        EntityPath::from_dag(host, dag, &self.prefix)
    }

    /// Entity path of a material node
    pub fn material_path(&self, host: &dyn HostScene, material: NodeHandle) -> Option<EntityPath> {
        let name = host.name(material)?;
        Some(self.prefix.child(&self.material_scope).child(&name))
    }
}

/// The synchronisation engine between a host scene and a render index
pub struct SyncContext {
    registry: Arc<AdapterRegistry>,
    adapters: BTreeMap<EntityPath, Box<dyn Adapter>>,
    node_paths: HashMap<NodeHandle, EntityPath>,
    services: SyncServices,
    queues: DeferredQueues,
    config: SyncConfig,
    last_selection: Option<SelectionResult>,
    frame: u64,
}

impl SyncContext {
    /// Create a context syncing into `render_index`
    pub fn new(
        registry: Arc<AdapterRegistry>,
        render_index: Box<dyn RenderIndex>,
        config: SyncConfig,
    ) -> Self {
        let mut services = SyncServices::new(render_index, &config);
        services.change_tracker.add_collection(&config.selection_collection);
        Self {
            registry,
            adapters: BTreeMap::new(),
            node_paths: HashMap::new(),
            services,
            queues: DeferredQueues::new(),
            config,
            last_selection: None,
            frame: 0,
        }
    }

    /// Create adapters for every supported node in the host scene.
    ///
    /// Returns the number of adapters created.
    pub fn populate_all(&mut self, host: &dyn HostScene) -> usize {
        let mut visited = HashSet::new();
        let mut created = 0;
        for root in host.roots() {
            created += self.sync_subtree(host, root, &mut visited);
        }
        for node in host.dependency_nodes() {
            if visited.insert(node) {
                created += usize::from(self.sync_node(host, node));
            }
        }
        info!(
            "Populated {created} adapters, {} render entities",
            self.services.render_index.entity_count()
        );
        created
    }

    /// Queue the work a host notification implies. Never mutates adapters
    /// or the render graph.
    pub fn notify(&mut self, event: &SceneEvent) {
        trace!("notify {:?} on {:?}", event.kind, event.node);
        if matches!(event.kind, SceneEventKind::NodeAdded | SceneEventKind::HierarchyChanged) {
            self.queues.enqueue_insertion(event.node);
        }

        for delivery in self.services.hub.matching(event) {
            let owner = delivery.owner;
            match delivery.action {
                CallbackAction::MarkDirty(bits) => self.queues.enqueue_dirty(owner, bits),
                CallbackAction::AttributeDirty => {
                    let Some(adapter) = self.adapters.get(&owner) else {
                        continue;
                    };
                    let attribute = delivery.attribute.as_deref().unwrap_or_default();
                    let bits = adapter.dirty_bits_for_attribute(attribute, delivery.from_ancestor);
                    if !delivery.from_ancestor {
                        let flags = adapter.rebuild_flags_for_attribute(attribute);
                        if !flags.is_empty() {
                            self.queues.enqueue_rebuild(owner.clone(), flags);
                        }
                        if adapter.affects_material_tag(attribute) {
                            self.queues.enqueue_material_tag(owner.clone());
                        }
                    }
                    self.queues.enqueue_dirty(owner, bits);
                }
                CallbackAction::Recreate => self.queues.enqueue_recreate(owner, delivery.target),
                CallbackAction::Remove => {
                    self.queues.enqueue_recreate(owner, NodeHandle::default());
                }
                CallbackAction::Rebuild(flags) => self.queues.enqueue_rebuild(owner, flags),
            }
        }
    }

    /// Forward every event in order
    pub fn notify_all<'e>(&mut self, events: impl IntoIterator<Item = &'e SceneEvent>) {
        for event in events {
            self.notify(event);
        }
    }

    /// Ask for every entity bound to `material` to be re-classified next
    /// tick, if the material's translucency class has changed by then
    pub fn notify_material_tag_changed(&mut self, material: EntityPath) {
        self.queues.enqueue_material_tag(material);
    }

    /// Ask for a rebuild of the adapter at `path` next tick
    pub fn request_rebuild(&mut self, path: EntityPath, flags: RebuildFlags) {
        self.queues.enqueue_rebuild(path, flags);
    }

    /// Drain the deferred queues. Runs once per frame, before the render
    /// graph is handed to the backend.
    pub fn tick(&mut self, host: &dyn HostScene, frame: &FrameContext) -> TickReport {
        self.frame = frame.frame;
        let mut report = TickReport {
            frame: frame.frame,
            ..TickReport::default()
        };

        let mut recreated = self.drain_recreate(host, &mut report);

        let mut visited = HashSet::new();
        for node in self.queues.take_insertions() {
            if !host.is_valid(node) {
                trace!("Dropping insertion of a destroyed node");
                report.dropped_stale += 1;
                continue;
            }
            report.inserted += self.sync_subtree(host, node, &mut visited);
        }

        // occurrence changes found while inserting queue more recreates
        recreated.extend(self.drain_recreate(host, &mut report));
        self.drain_rebuild(host, &recreated, &mut report);

        for (path, bits) in self.queues.take_dirty() {
            if recreated.contains(&path) {
                continue;
            }
            if let Some(adapter) = self.adapters.get_mut(&path) {
                if adapter.mark_dirty(host, &mut self.services, bits) {
                    report.dirtied += 1;
                }
            }
        }

        for material in self.queues.take_material_tags() {
            if recreated.contains(&material) {
                continue;
            }
            let flipped = self
                .adapters
                .get_mut(&material)
                .is_some_and(|adapter| adapter.reclassify(host));
            if flipped {
                report.material_fanout +=
                    self.mark_material_users(host, &material, DirtyBits::MATERIAL_ID);
            }
        }

        self.queues.clear();
        if !report.is_idle() {
            debug!("Tick {report:?}");
        }
        report
    }

    /// Map the host selection to render entities.
    ///
    /// Bumps the selection collection in the change tracker whenever the
    /// result differs from the previous call.
    pub fn populate_selected_paths(
        &mut self,
        host: &dyn HostScene,
        selection: &[DagPath],
    ) -> SelectionResult {
        let result = SelectionMapper::new(host, &self.services.instances).map(selection);
        if self.last_selection.as_ref() != Some(&result) {
            self.services
                .change_tracker
                .mark_collection_dirty(&self.config.selection_collection);
            self.last_selection = Some(result.clone());
        }
        result
    }

    /// Live adapter at `path`, for inspection
    pub fn lookup_adapter(&self, path: &EntityPath) -> Option<&dyn Adapter> {
        self.adapters.get(path).map(|adapter| &**adapter)
    }

    /// Pull a derived value from the adapter at `path`
    pub fn get(&self, host: &dyn HostScene, path: &EntityPath, key: &str) -> Option<AttrValue> {
        self.adapters.get(path)?.get(host, &self.services, key)
    }

    /// Pull a raw node parameter through the adapter at `path`
    pub fn get_param_value(
        &self,
        host: &dyn HostScene,
        path: &EntityPath,
        name: &str,
    ) -> Option<AttrValue> {
        self.adapters.get(path)?.get_param_value(host, name)
    }

    /// Paths of every live adapter, sorted
    pub fn adapter_paths(&self) -> impl Iterator<Item = &EntityPath> {
        self.adapters.keys()
    }

    /// Number of live adapters
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Whether notifications are waiting for the next tick
    pub fn has_pending_work(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Pending deferred work
    pub fn queues(&self) -> &DeferredQueues {
        &self.queues
    }

    /// The render graph
    pub fn render_index(&self) -> &dyn RenderIndex {
        self.services.render_index()
    }

    /// Per-entity dirty state
    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.services.change_tracker
    }

    /// Per-entity dirty state, for the backend to clear consumed bits
    pub fn change_tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.services.change_tracker
    }

    /// Instance bookkeeping
    pub fn instances(&self) -> &InstanceTracker {
        &self.services.instances
    }

    /// Services lent to adapters
    pub fn services(&self) -> &SyncServices {
        &self.services
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Frame of the last tick
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn sync_subtree(
        &mut self,
        host: &dyn HostScene,
        node: NodeHandle,
        visited: &mut HashSet<NodeHandle>,
    ) -> usize {
        let mut created = 0;
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            created += usize::from(self.sync_node(host, node));
            stack.extend(host.children(node).into_iter().rev());
        }
        created
    }

    /// Create the adapter for `node`, or reconcile its occurrences if one
    /// already exists. Returns true if an adapter was created.
    fn sync_node(&mut self, host: &dyn HostScene, node: NodeHandle) -> bool {
        if !host.is_valid(node) {
            return false;
        }
        if self.services.instances.is_tracked(node) {
            let live = host.dag_paths(node);
            let change = self.services.instances.reconcile(node, &live);
            self.apply_occurrence_change(host, node, change);
            return false;
        }

        let (path, dag_path, live) = if host.is_dag(node) {
            let live = host.dag_paths(node);
            let Some(first) = live.first().cloned() else {
                return false;
            };
            let Some(path) = self.services.dag_entity_path(host, &first) else {
                return false;
            };
            (path, Some(first), live)
        } else {
            let Some(path) = self.services.material_path(host, node) else {
                return false;
            };
            (path, None, Vec::new())
        };

        // a node whose first occurrence moved gets a fresh adapter
        if let Some(existing) = self.node_paths.get(&node) {
            if *existing != path {
                self.queues.enqueue_recreate(existing.clone(), node);
            }
            return false;
        }

        let seed = AdapterSeed {
            node,
            dag_path,
            path,
        };
        let Some(mut adapter) = self.build_adapter(host, seed) else {
            return false;
        };
        let path = adapter.base().path().clone();

        if adapter.kind() == AdapterKind::Shape {
            if let Some(first) = adapter.base().dag_path().cloned() {
                self.services.instances.track(node, path.clone(), first);
                let change = self.services.instances.reconcile(node, &live);
                match change {
                    OccurrenceChange::Promoted { .. } => {
                        adapter.sync_instancing(host, &mut self.services, &change);
                    }
                    OccurrenceChange::Unchanged | OccurrenceChange::Reindexed { .. } => {}
                    OccurrenceChange::Demoted { master }
                    | OccurrenceChange::MasterLost { master } => {
                        self.queues.enqueue_recreate(master, node);
                    }
                }
            }
        }

        adapter.create_callbacks(host, &mut self.services);
        self.install(path, adapter);
        true
    }

    fn install(&mut self, path: EntityPath, adapter: Box<dyn Adapter>) {
        self.node_paths.insert(adapter.base().node(), path.clone());
        self.adapters.insert(path, adapter);
    }

    /// Build, gate and populate an adapter without registering it
    fn build_adapter(
        &mut self,
        host: &dyn HostScene,
        seed: AdapterSeed,
    ) -> Option<Box<dyn Adapter>> {
        if let Some(existing) = self.adapters.get(&seed.path) {
            if existing.base().node() == seed.node {
                trace!("{} already synced", seed.path);
            } else {
                warn!("{}", SyncError::DuplicatePath(seed.path.to_string()));
            }
            return None;
        }

        let path = seed.path.clone();
        let mut adapter = self.registry.create_for(host, seed)?;
        if !adapter.is_supported(host, &self.services) {
            debug!("{}", SyncError::UnsupportedAdapter(path.to_string()));
            return None;
        }
        if !adapter.populate(host, &mut self.services) {
            debug!("Populating {path} failed");
            return None;
        }
        Some(adapter)
    }

    fn apply_occurrence_change(
        &mut self,
        host: &dyn HostScene,
        node: NodeHandle,
        change: OccurrenceChange,
    ) {
        match &change {
            OccurrenceChange::Unchanged => {}
            OccurrenceChange::Promoted { master } => {
                if let Some(adapter) = self.adapters.get_mut(master) {
                    adapter.sync_instancing(host, &mut self.services, &change);
                }
                self.queues.enqueue_rebuild(master.clone(), RebuildFlags::CALLBACKS);
            }
            OccurrenceChange::Reindexed { master, .. } => {
                if let Some(adapter) = self.adapters.get_mut(master) {
                    adapter.sync_instancing(host, &mut self.services, &change);
                }
            }
            OccurrenceChange::Demoted { master } | OccurrenceChange::MasterLost { master } => {
                debug!("Collapsing {master}: {change:?}");
                self.queues.enqueue_recreate(master.clone(), node);
            }
        }
    }

    fn drain_recreate(
        &mut self,
        host: &dyn HostScene,
        report: &mut TickReport,
    ) -> HashSet<EntityPath> {
        let mut recreated = HashSet::new();
        loop {
            let batch = self.queues.take_recreate();
            if batch.is_empty() {
                break;
            }
            for (path, node) in batch {
                if !recreated.insert(path.clone()) {
                    continue;
                }
                let removed = self.remove_adapter(&path);
                if removed == Some(AdapterKind::Material) {
                    report.dirtied += self.mark_material_users(host, &path, DirtyBits::MATERIAL_ID);
                }
                if node.is_none() {
                    report.removed += usize::from(removed.is_some());
                    continue;
                }
                if !host.is_valid(node) {
                    debug!("{}", SyncError::StaleHandle(path.to_string()));
                    report.dropped_stale += 1;
                    continue;
                }
                self.sync_node(host, node);
                report.recreated += 1;
            }
        }
        recreated
    }

    fn drain_rebuild(
        &mut self,
        host: &dyn HostScene,
        recreated: &HashSet<EntityPath>,
        report: &mut TickReport,
    ) {
        for (path, flags) in self.queues.take_rebuild() {
            if recreated.contains(&path) {
                report.subsumed += 1;
                continue;
            }
            let Some(adapter) = self.adapters.get(&path) else {
                continue;
            };
            if adapter.base().live_node(host).is_none() {
                debug!("{}", SyncError::StaleHandle(path.to_string()));
                report.dropped_stale += 1;
                continue;
            }

            if flags.contains(RebuildFlags::PRIM) {
                if self.repopulate(host, &path) {
                    report.prim_rebuilds += 1;
                    report.callback_rebuilds +=
                        usize::from(flags.contains(RebuildFlags::CALLBACKS));
                }
            } else if flags.contains(RebuildFlags::CALLBACKS) {
                if let Some(adapter) = self.adapters.get_mut(&path) {
                    adapter.remove_callbacks(&mut self.services);
                    adapter.create_callbacks(host, &mut self.services);
                    report.callback_rebuilds += 1;
                }
            }
        }
    }

    /// Replace the adapter at `path` with a freshly populated one for the
    /// same node and occurrence. Callbacks are always reinstalled.
    fn repopulate(&mut self, host: &dyn HostScene, path: &EntityPath) -> bool {
        let Some(mut old) = self.adapters.remove(path) else {
            return false;
        };
        self.node_paths.remove(&old.base().node());
        old.remove_callbacks(&mut self.services);
        old.remove_prim(&mut self.services);
        let seed = AdapterSeed {
            node: old.base().node(),
            dag_path: old.base().dag_path().cloned(),
            path: path.clone(),
        };
        drop(old);

        let Some(mut adapter) = self.build_adapter(host, seed) else {
            self.services.instances.forget_master(path);
            return false;
        };
        if self.services.instances.record_for_master(path).is_some() {
            let promoted = OccurrenceChange::Promoted { master: path.clone() };
            adapter.sync_instancing(host, &mut self.services, &promoted);
        }
        adapter.create_callbacks(host, &mut self.services);
        self.install(path.clone(), adapter);
        debug!("Rebuilt {path}");
        true
    }

    fn remove_adapter(&mut self, path: &EntityPath) -> Option<AdapterKind> {
        let mut adapter = self.adapters.remove(path)?;
        adapter.remove_callbacks(&mut self.services);
        adapter.remove_prim(&mut self.services);
        if self.node_paths.get(&adapter.base().node()) == Some(path) {
            self.node_paths.remove(&adapter.base().node());
        }
        self.services.instances.forget_master(path);
        debug!("Removed adapter {path}");
        Some(adapter.kind())
    }

    /// Mark every adapter bound to `material`. Returns how many were marked.
    fn mark_material_users(
        &mut self,
        host: &dyn HostScene,
        material: &EntityPath,
        bits: DirtyBits,
    ) -> usize {
        let bound: Vec<EntityPath> = self
            .adapters
            .iter()
            .filter(|(_, adapter)| adapter.bound_material() == Some(material))
            .map(|(path, _)| path.clone())
            .collect();
        let mut count = 0;
        for path in bound {
            if let Some(adapter) = self.adapters.get_mut(&path) {
                count += usize::from(adapter.mark_dirty(host, &mut self.services, bits));
            }
        }
        count
    }
}
