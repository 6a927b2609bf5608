//! Shape adapter
//!
//! Syncs geometry nodes (`mesh`, `nurbsCurve`). A shape reachable through
//! several DAG occurrences owns an extra instancer entity at
//! `<master>/instancer` whose per-instance transforms are cached here.

use super::{dag_transform, keys, Adapter, AdapterBase, AdapterKind, AdapterSeed};
use crate::events::{CallbackAction, SceneEventKind};
use crate::foundation::math::{Mat4, Vec3};
use crate::host::{AttrValue, DagPath, HostScene};
use crate::render::{DirtyBits, EntityKind, RebuildFlags};
use crate::scene::instancing::OccurrenceChange;
use crate::scene::{EntityPath, SyncServices};
use log::debug;

const INSTANCER_NAME: &str = "instancer";
const INSTANCER_TAG: &str = "instancer";

/// Adapter for geometry nodes
#[derive(Debug)]
pub struct ShapeAdapter {
    base: AdapterBase,
    type_tag: &'static str,
    world: Mat4,
    material: Option<EntityPath>,
    instancer: Option<EntityPath>,
    instance_indices: Vec<u32>,
    instance_transforms: Vec<Mat4>,
}

impl ShapeAdapter {
    /// Shape adapter producing entities tagged `type_tag`
    pub fn new(seed: AdapterSeed, type_tag: &'static str) -> Self {
        Self {
            base: AdapterBase::new(seed),
            type_tag,
            world: Mat4::identity(),
            material: None,
            instancer: None,
            instance_indices: Vec::new(),
            instance_transforms: Vec::new(),
        }
    }

    /// Cached world transform of the master occurrence
    pub fn world_transform(&self) -> &Mat4 {
        &self.world
    }

    /// Instancer entity path while the shape is instanced
    pub fn instancer_path(&self) -> Option<&EntityPath> {
        self.instancer.as_ref()
    }

    /// Whether the shape is in instanced mode
    pub fn is_instanced(&self) -> bool {
        self.instancer.is_some()
    }

    fn occurrences(&self, services: &SyncServices) -> Vec<DagPath> {
        match services.instances().record_for_master(self.base.path()) {
            Some(record) => record.occurrences().values().cloned().collect(),
            None => self.base.dag_path().cloned().into_iter().collect(),
        }
    }

    fn refresh_instances(&mut self, host: &dyn HostScene, services: &SyncServices) {
        self.instance_indices.clear();
        self.instance_transforms.clear();
        let Some(record) = services.instances().record_for_master(self.base.path()) else {
            return;
        };
        for (index, occurrence) in record.occurrences() {
            self.instance_indices.push(*index);
            self.instance_transforms
                .push(host.world_transform(occurrence).unwrap_or_else(Mat4::identity));
        }
    }

    fn extent(points: &[Vec3]) -> Option<(Vec3, Vec3)> {
        let first = *points.first()?;
        Some(points.iter().fold((first, first), |(lo, hi), p| (lo.inf(p), hi.sup(p))))
    }
}

impl Adapter for ShapeAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AdapterBase {
        &mut self.base
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Shape
    }

    fn type_tag(&self) -> &str {
        self.type_tag
    }

    fn refresh(&mut self, host: &dyn HostScene, services: &SyncServices, bits: DirtyBits) {
        if bits.contains(DirtyBits::TRANSFORM) {
            if let Some(world) = dag_transform(host, self.base.dag_path()) {
                self.world = world;
            }
            if self.instancer.is_some() {
                self.refresh_instances(host, services);
            }
        }
        if bits.contains(DirtyBits::MATERIAL_ID) {
            self.material = self
                .base
                .live_node(host)
                .and_then(|node| host.material_binding(node))
                .and_then(|material| services.material_path(host, material));
        }
    }

    fn create_callbacks(&mut self, host: &dyn HostScene, services: &mut SyncServices) {
        if self.base.live_node(host).is_none() {
            return;
        }
        let node = self.base.node();
        self.base.subscribe(services, node, SceneEventKind::NodePreRemoval, CallbackAction::Remove);
        self.base.subscribe(services, node, SceneEventKind::NodeRenamed, CallbackAction::Recreate);
        self.base.subscribe(
            services,
            node,
            SceneEventKind::AttributeChanged,
            CallbackAction::AttributeDirty,
        );
        self.base.subscribe(
            services,
            node,
            SceneEventKind::ConnectionChanged,
            CallbackAction::MarkDirty(DirtyBits::MATERIAL_ID),
        );
        let occurrences = self.occurrences(services);
        self.base.subscribe_ancestors(services, &occurrences);
    }

    fn get(&self, host: &dyn HostScene, _services: &SyncServices, key: &str) -> Option<AttrValue> {
        let node = self.base.live_node(host)?;
        match key {
            keys::TRANSFORM => Some(AttrValue::Matrix(self.world)),
            keys::VISIBILITY => Some(AttrValue::Bool(host.is_visible(self.base.dag_path()?))),
            keys::POINTS => host.attribute(node, "points"),
            keys::EXTENT => match host.attribute(node, "points")? {
                AttrValue::Vec3Array(points) => {
                    let (lo, hi) = Self::extent(&points)?;
                    Some(AttrValue::Vec3Array(vec![lo, hi]))
                }
                _ => None,
            },
            keys::MATERIAL_ID => self.material.as_ref().map(|m| AttrValue::String(m.to_string())),
            keys::INSTANCE_TRANSFORMS => self
                .is_instanced()
                .then(|| AttrValue::MatrixArray(self.instance_transforms.clone())),
            keys::INSTANCE_INDICES => self
                .is_instanced()
                .then(|| {
                    AttrValue::IntArray(
                        self.instance_indices.iter().map(|i| i64::from(*i)).collect(),
                    )
                }),
            _ => None,
        }
    }

    fn dirty_bits_for_attribute(&self, attribute: &str, from_ancestor: bool) -> DirtyBits {
        match attribute {
            "matrix" => DirtyBits::TRANSFORM,
            "visibility" => DirtyBits::VISIBILITY,
            _ if from_ancestor => DirtyBits::CLEAN,
            "points" => DirtyBits::POINTS | DirtyBits::EXTENT,
            "faceVertexCounts" | "faceVertexIndices" => DirtyBits::TOPOLOGY,
            "normals" => DirtyBits::NORMALS,
            _ => DirtyBits::PRIMVAR,
        }
    }

    fn rebuild_flags_for_attribute(&self, attribute: &str) -> RebuildFlags {
        // smoothing changes the refined topology
        match attribute {
            "displaySmoothMesh" | "smoothLevel" => RebuildFlags::PRIM,
            _ => RebuildFlags::empty(),
        }
    }

    fn bound_material(&self) -> Option<&EntityPath> {
        self.material.as_ref()
    }

    fn sync_instancing(
        &mut self,
        host: &dyn HostScene,
        services: &mut SyncServices,
        change: &OccurrenceChange,
    ) -> bool {
        if !self.base.is_populated() {
            return false;
        }
        let bits = match change {
            OccurrenceChange::Promoted { .. } => {
                let path = self.base.path().child(INSTANCER_NAME);
                if !self.base.insert_owned(
                    services,
                    EntityKind::Instancer,
                    INSTANCER_TAG,
                    path.clone(),
                    DirtyBits::ALL_DIRTY,
                ) {
                    return false;
                }
                debug!("Promoted {} to instanced", self.base.path());
                self.instancer = Some(path);
                DirtyBits::INSTANCER | DirtyBits::INSTANCE_INDEX | DirtyBits::TRANSFORM
            }
            OccurrenceChange::Reindexed { .. } if self.instancer.is_some() => {
                DirtyBits::INSTANCE_INDEX | DirtyBits::TRANSFORM
            }
            _ => return false,
        };

        self.refresh_instances(host, services);
        if let Some(instancer) = self.instancer.clone() {
            services.mark_dirty(&instancer, bits);
        }
        let path = self.base.path().clone();
        services.mark_dirty(&path, DirtyBits::INSTANCER);

        // new occurrences bring new ancestors; resubscribe in place
        if matches!(change, OccurrenceChange::Reindexed { .. }) {
            self.remove_callbacks(services);
            self.create_callbacks(host, services);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::foundation::math::Transform;
    use crate::host::MemoryScene;
    use crate::render::{MemoryRenderIndex, RenderIndex};
    use approx::assert_relative_eq;

    fn setup() -> (MemoryScene, SyncServices, ShapeAdapter) {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let cube = scene.create_dag_node("cube1", &["mesh"], Some(root)).unwrap();
        scene
            .set_local_transform(
                root,
                Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).to_matrix(),
            )
            .unwrap();
        scene
            .set_attribute(
                cube,
                "points",
                AttrValue::Vec3Array(vec![Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 4.0, -2.0)]),
            )
            .unwrap();

        let services =
            SyncServices::new(Box::new(MemoryRenderIndex::new()), &SyncConfig::default());
        let adapter = ShapeAdapter::new(
            AdapterSeed {
                node: cube,
                dag_path: scene.dag_path("/root/cube1"),
                path: EntityPath::parse("/root/cube1").unwrap(),
            },
            "mesh",
        );
        (scene, services, adapter)
    }

    #[test]
    fn test_populate_caches_transform() {
        let (scene, mut services, mut adapter) = setup();
        assert!(adapter.is_supported(&scene, &services));
        assert!(adapter.populate(&scene, &mut services));

        assert_eq!(services.render_index().entity_count(), 1);
        let translation = adapter.world_transform().column(3);
        assert_relative_eq!(translation[0], 1.0);
        assert_relative_eq!(translation[2], 3.0);
    }

    #[test]
    fn test_extent_and_stale_handle() {
        let (mut scene, mut services, mut adapter) = setup();
        adapter.populate(&scene, &mut services);

        let extent = adapter.get(&scene, &services, keys::EXTENT).unwrap();
        assert_eq!(
            extent,
            AttrValue::Vec3Array(vec![Vec3::new(-1.0, 0.0, -2.0), Vec3::new(1.0, 4.0, 2.0)])
        );

        let cube = adapter.base().node();
        scene.delete_node(cube).unwrap();
        assert!(adapter.get(&scene, &services, keys::TRANSFORM).is_none());
        assert!(adapter.get_param_value(&scene, "points").is_none());
    }

    #[test]
    fn test_unsupported_tag() {
        let (scene, _, adapter) = setup();
        let services = SyncServices::new(
            Box::new(MemoryRenderIndex::with_supported_types(&["sphereLight"])),
            &SyncConfig::default(),
        );
        assert!(!adapter.is_supported(&scene, &services));
    }

    #[test]
    fn test_attribute_dirty_bits() {
        let (_, _, adapter) = setup();
        assert_eq!(adapter.dirty_bits_for_attribute("matrix", true), DirtyBits::TRANSFORM);
        assert_eq!(adapter.dirty_bits_for_attribute("points", true), DirtyBits::CLEAN);
        assert_eq!(
            adapter.dirty_bits_for_attribute("points", false),
            DirtyBits::POINTS | DirtyBits::EXTENT
        );
        assert_eq!(adapter.dirty_bits_for_attribute("uvSet", false), DirtyBits::PRIMVAR);
        assert_eq!(adapter.rebuild_flags_for_attribute("smoothLevel"), RebuildFlags::PRIM);
        assert!(adapter.rebuild_flags_for_attribute("points").is_empty());
    }

    #[test]
    fn test_callbacks_cover_node_and_ancestors() {
        let (scene, mut services, mut adapter) = setup();
        adapter.populate(&scene, &mut services);
        adapter.create_callbacks(&scene, &mut services);
        // four on the shape, two on its parent
        assert_eq!(adapter.base().subscription_count(), 6);

        adapter.remove_callbacks(&mut services);
        adapter.remove_callbacks(&mut services);
        assert!(services.hub().is_empty());
    }
}
