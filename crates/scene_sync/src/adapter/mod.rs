//! Adapters
//!
//! An adapter mediates between one host node and the render entities
//! derived from it. The sync context owns every adapter in a path-keyed
//! map; adapters never hold a reference back to the context. Instead each
//! lifecycle call borrows the context's [`SyncServices`] for its duration.
//!
//! Lifecycle:
//!
//! ```text
//! Unpopulated --populate--> Populated --remove_prim--> Removed
//!                            |    ^
//!                            +----+ mark_dirty
//! ```

mod light;
mod material;
mod registry;
mod shape;

pub use light::LightAdapter;
pub use material::{MaterialAdapter, TAG_OPAQUE, TAG_TRANSLUCENT};
pub use registry::{adapter_factory, AdapterFactory, AdapterRegistry, PluginLoader};
pub use shape::ShapeAdapter;

use crate::foundation::math::Mat4;
use crate::events::{CallbackAction, SceneEventKind, SubscriptionId};
use crate::host::{AttrValue, DagPath, HostScene, NodeHandle};
use crate::render::{DirtyBits, EntityKind, RebuildFlags};
use crate::scene::instancing::OccurrenceChange;
use crate::scene::{EntityPath, SyncServices};
use std::fmt;

/// Keys understood by [`Adapter::get`]
pub mod keys {
    /// World transform of the entity
    pub const TRANSFORM: &str = "transform";
    /// Effective visibility
    pub const VISIBILITY: &str = "visibility";
    /// Geometry points
    pub const POINTS: &str = "points";
    /// Bounding box as `[min, max]`
    pub const EXTENT: &str = "extent";
    /// Entity path of the bound material
    pub const MATERIAL_ID: &str = "materialId";
    /// Per-instance world transforms, ordered by instance index
    pub const INSTANCE_TRANSFORMS: &str = "instanceTransforms";
    /// Instance indices
    pub const INSTANCE_INDICES: &str = "instanceIndices";
    /// Translucency classification of a material
    pub const MATERIAL_TAG: &str = "materialTag";
}

/// Lifecycle state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Created, no render entity yet
    Unpopulated,
    /// Render entities exist
    Populated,
    /// Entities removed; terminal
    Removed,
}

/// Category of adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Geometry
    Shape,
    /// Light source
    Light,
    /// Material (non-DAG)
    Material,
}

/// Everything a factory needs to build an adapter
#[derive(Debug, Clone)]
pub struct AdapterSeed {
    /// Source node
    pub node: NodeHandle,
    /// Occurrence the adapter was derived from (`None` for non-DAG nodes)
    pub dag_path: Option<DagPath>,
    /// Entity path assigned to the adapter
    pub path: EntityPath,
}

/// State shared by every adapter implementation
#[derive(Debug)]
pub struct AdapterBase {
    node: NodeHandle,
    dag_path: Option<DagPath>,
    path: EntityPath,
    state: AdapterState,
    subscriptions: Vec<SubscriptionId>,
    owned: Vec<EntityPath>,
}

impl AdapterBase {
    /// Fresh, unpopulated base
    pub fn new(seed: AdapterSeed) -> Self {
        Self {
            node: seed.node,
            dag_path: seed.dag_path,
            path: seed.path,
            state: AdapterState::Unpopulated,
            subscriptions: Vec::new(),
            owned: Vec::new(),
        }
    }

    /// Source node handle (may be stale)
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Source node handle, only if it is still valid
    pub fn live_node(&self, host: &dyn HostScene) -> Option<NodeHandle> {
        host.is_valid(self.node).then_some(self.node)
    }

    /// Occurrence the adapter was derived from
    pub fn dag_path(&self) -> Option<&DagPath> {
        self.dag_path.as_ref()
    }

    /// Primary entity path
    pub fn path(&self) -> &EntityPath {
        &self.path
    }

    /// Lifecycle state
    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Whether the adapter's entities exist
    pub fn is_populated(&self) -> bool {
        self.state == AdapterState::Populated
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Render entities this adapter inserted
    pub fn owned_entities(&self) -> &[EntityPath] {
        &self.owned
    }

    /// Insert the primary entity, all dirty, and enter `Populated`
    pub fn insert_primary(
        &mut self,
        services: &mut SyncServices,
        kind: EntityKind,
        type_tag: &str,
    ) -> bool {
        if self.state != AdapterState::Unpopulated {
            return false;
        }
        if !services.insert_entity(kind, type_tag, &self.path, DirtyBits::ALL_DIRTY) {
            return false;
        }
        self.owned.push(self.path.clone());
        self.state = AdapterState::Populated;
        true
    }

    /// Insert an additional entity owned by this adapter
    pub fn insert_owned(
        &mut self,
        services: &mut SyncServices,
        kind: EntityKind,
        type_tag: &str,
        path: EntityPath,
        initial: DirtyBits,
    ) -> bool {
        if !services.insert_entity(kind, type_tag, &path, initial) {
            return false;
        }
        self.owned.push(path);
        true
    }

    /// Remove every owned entity and enter `Removed`.
    ///
    /// Does nothing if the adapter was never populated.
    pub fn remove_owned(&mut self, services: &mut SyncServices) {
        if self.state != AdapterState::Populated {
            return;
        }
        for path in self.owned.drain(..).rev() {
            services.remove_entity(&path);
        }
        self.state = AdapterState::Removed;
    }

    /// Install one subscription owned by this adapter
    pub fn subscribe(
        &mut self,
        services: &mut SyncServices,
        source: NodeHandle,
        kind: SceneEventKind,
        action: CallbackAction,
    ) {
        let id = services.hub_mut().subscribe(source, kind, &self.path, self.node, action);
        self.subscriptions.push(id);
    }

    /// Drop every subscription. Safe to call repeatedly.
    pub fn unsubscribe_all(&mut self, services: &mut SyncServices) {
        for id in self.subscriptions.drain(..) {
            services.hub_mut().unsubscribe(id);
        }
    }

    /// Subscribe to the events every DAG occurrence needs from its ancestors
    pub fn subscribe_ancestors(&mut self, services: &mut SyncServices, occurrences: &[DagPath]) {
        let mut seen = Vec::new();
        for ancestor in occurrences.iter().flat_map(DagPath::ancestors) {
            if seen.contains(ancestor) {
                continue;
            }
            seen.push(*ancestor);
            self.subscribe(
                services,
                *ancestor,
                SceneEventKind::AttributeChanged,
                CallbackAction::AttributeDirty,
            );
            self.subscribe(
                services,
                *ancestor,
                SceneEventKind::NodeRenamed,
                CallbackAction::Recreate,
            );
        }
    }
}

/// A per-node mediator between the host graph and the render graph.
///
/// Concrete adapters specialise attribute extraction; the lifecycle
/// bookkeeping lives in [`AdapterBase`] and the provided methods.
pub trait Adapter: fmt::Debug {
    /// Shared lifecycle state
    fn base(&self) -> &AdapterBase;

    /// Shared lifecycle state, mutably
    fn base_mut(&mut self) -> &mut AdapterBase;

    /// Category of adapter
    fn kind(&self) -> AdapterKind;

    /// Backend type tag of the primary entity
    fn type_tag(&self) -> &str;

    /// Render-entity category of the primary entity
    fn entity_kind(&self) -> EntityKind {
        match self.kind() {
            AdapterKind::Shape => EntityKind::Rprim,
            AdapterKind::Light | AdapterKind::Material => EntityKind::Sprim,
        }
    }

    /// Creation-time gate; unsupported adapters are discarded unpopulated
    fn is_supported(&self, host: &dyn HostScene, services: &SyncServices) -> bool {
        self.base().live_node(host).is_some()
            && services.render_index().is_type_supported(self.entity_kind(), self.type_tag())
    }

    /// Insert the render entities with every dirty bit set
    fn populate(&mut self, host: &dyn HostScene, services: &mut SyncServices) -> bool {
        let kind = self.entity_kind();
        let tag = self.type_tag().to_string();
        if !self.base_mut().insert_primary(services, kind, &tag) {
            return false;
        }
        self.refresh(host, services, DirtyBits::ALL_DIRTY);
        true
    }

    /// Recompute cached derived state for `bits`
    fn refresh(&mut self, _host: &dyn HostScene, _services: &SyncServices, _bits: DirtyBits) {}

    /// OR `bits` into the tracker and refresh cached state
    fn mark_dirty(
        &mut self,
        host: &dyn HostScene,
        services: &mut SyncServices,
        bits: DirtyBits,
    ) -> bool {
        if !self.base().is_populated() || bits.is_empty() {
            return false;
        }
        self.refresh(host, services, bits);
        let path = self.base().path().clone();
        services.mark_dirty(&path, bits)
    }

    /// Delete the render entities; no-op when never populated
    fn remove_prim(&mut self, services: &mut SyncServices) {
        self.base_mut().remove_owned(services);
    }

    /// Install event subscriptions on the host nodes this adapter tracks
    fn create_callbacks(&mut self, host: &dyn HostScene, services: &mut SyncServices);

    /// Uninstall every subscription. Idempotent.
    fn remove_callbacks(&mut self, services: &mut SyncServices) {
        self.base_mut().unsubscribe_all(services);
    }

    /// Pull a derived value. Stale handles yield `None`.
    fn get(&self, host: &dyn HostScene, services: &SyncServices, key: &str) -> Option<AttrValue>;

    /// Pull a raw node parameter. Stale handles yield `None`.
    fn get_param_value(&self, host: &dyn HostScene, name: &str) -> Option<AttrValue> {
        let node = self.base().live_node(host)?;
        host.attribute(node, name)
    }

    /// Dirty bits invalidated by a change to `attribute`
    fn dirty_bits_for_attribute(&self, attribute: &str, from_ancestor: bool) -> DirtyBits;

    /// Rebuild work required by a change to one of the node's own attributes
    fn rebuild_flags_for_attribute(&self, _attribute: &str) -> RebuildFlags {
        RebuildFlags::empty()
    }

    /// Whether changing `attribute` can flip the material's translucency
    fn affects_material_tag(&self, _attribute: &str) -> bool {
        false
    }

    /// Re-derive the translucency classification. Returns true if it
    /// differs from the one last seen.
    fn reclassify(&mut self, _host: &dyn HostScene) -> bool {
        false
    }

    /// Material entity this adapter is bound to
    fn bound_material(&self) -> Option<&EntityPath> {
        None
    }

    /// React to a change in the node's occurrences. Returns true if handled
    /// in place.
    fn sync_instancing(
        &mut self,
        _host: &dyn HostScene,
        _services: &mut SyncServices,
        _change: &OccurrenceChange,
    ) -> bool {
        false
    }
}

/// World transform of a DAG-backed adapter's occurrence
pub(crate) fn dag_transform(host: &dyn HostScene, dag: Option<&DagPath>) -> Option<Mat4> {
    host.world_transform(dag?)
}

/// Register the shape, light and material adapters
pub fn register_builtin_adapters(registry: &AdapterRegistry) {
    let shapes: [(&str, &'static str); 2] = [("mesh", "mesh"), ("nurbsCurve", "basisCurves")];
    for (node_type, tag) in shapes {
        let factory = adapter_factory(move |seed| ShapeAdapter::new(seed, tag));
        let _ = registry.register(node_type.into(), factory);
    }

    let lights: [(&str, &'static str); 4] = [
        ("pointLight", "sphereLight"),
        ("spotLight", "sphereLight"),
        ("directionalLight", "distantLight"),
        ("areaLight", "rectLight"),
    ];
    for (node_type, tag) in lights {
        let factory = adapter_factory(move |seed| LightAdapter::new(seed, tag));
        let _ = registry.register(node_type.into(), factory);
    }

    for node_type in ["lambert", "standardSurface"] {
        let _ = registry.register(node_type.into(), adapter_factory(MaterialAdapter::new));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::render::{MemoryRenderIndex, RenderIndex};

    fn services() -> SyncServices {
        SyncServices::new(Box::new(MemoryRenderIndex::new()), &SyncConfig::default())
    }

    fn seed(path: &str) -> AdapterSeed {
        AdapterSeed {
            node: NodeHandle::default(),
            dag_path: None,
            path: EntityPath::parse(path).unwrap(),
        }
    }

    #[test]
    fn test_base_lifecycle() {
        let mut services = services();
        let mut base = AdapterBase::new(seed("/root/cube"));
        assert_eq!(base.state(), AdapterState::Unpopulated);

        assert!(base.insert_primary(&mut services, EntityKind::Rprim, "mesh"));
        assert!(!base.insert_primary(&mut services, EntityKind::Rprim, "mesh"));
        assert_eq!(base.state(), AdapterState::Populated);
        assert_eq!(
            services.change_tracker().dirty_bits(base.path()),
            Some(DirtyBits::ALL_DIRTY)
        );

        base.remove_owned(&mut services);
        assert_eq!(base.state(), AdapterState::Removed);
        assert_eq!(services.render_index().entity_count(), 0);
        assert!(services.change_tracker().dirty_bits(base.path()).is_none());
    }

    #[test]
    fn test_remove_unpopulated_is_noop() {
        let mut services = services();
        let mut base = AdapterBase::new(seed("/root/cube"));
        base.remove_owned(&mut services);
        assert_eq!(base.state(), AdapterState::Unpopulated);
    }

    #[test]
    fn test_unsubscribe_all_is_idempotent() {
        let mut services = services();
        let mut base = AdapterBase::new(seed("/root/cube"));
        base.subscribe(
            &mut services,
            NodeHandle::default(),
            SceneEventKind::NodeRenamed,
            CallbackAction::Recreate,
        );
        assert_eq!(services.hub().len(), 1);

        base.unsubscribe_all(&mut services);
        base.unsubscribe_all(&mut services);
        assert!(services.hub().is_empty());
        assert_eq!(base.subscription_count(), 0);
    }

    #[test]
    fn test_builtin_registration() {
        let registry = AdapterRegistry::new();
        register_builtin_adapters(&registry);
        let node_types = [
            "mesh",
            "nurbsCurve",
            "pointLight",
            "areaLight",
            "lambert",
            "standardSurface",
        ];
        for node_type in node_types {
            assert!(registry.has_factory(&node_type.into()), "{node_type}");
        }
        assert!(!registry.has_factory(&"blinn".into()));
    }
}
