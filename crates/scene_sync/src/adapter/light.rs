//! Light adapter

use super::{dag_transform, keys, Adapter, AdapterBase, AdapterKind, AdapterSeed};
use crate::events::{CallbackAction, SceneEventKind};
use crate::foundation::math::Mat4;
use crate::host::{AttrValue, HostScene};
use crate::render::DirtyBits;
use crate::scene::SyncServices;

/// Adapter for light nodes; only the first occurrence is synced
#[derive(Debug)]
pub struct LightAdapter {
    base: AdapterBase,
    type_tag: &'static str,
    world: Mat4,
}

impl LightAdapter {
    /// Light adapter producing entities tagged `type_tag`
    pub fn new(seed: AdapterSeed, type_tag: &'static str) -> Self {
        Self {
            base: AdapterBase::new(seed),
            type_tag,
            world: Mat4::identity(),
        }
    }
}

impl Adapter for LightAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AdapterBase {
        &mut self.base
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Light
    }

    fn type_tag(&self) -> &str {
        self.type_tag
    }

    fn refresh(&mut self, host: &dyn HostScene, _services: &SyncServices, bits: DirtyBits) {
        if bits.contains(DirtyBits::TRANSFORM) {
            if let Some(world) = dag_transform(host, self.base.dag_path()) {
                self.world = world;
            }
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
        let occurrences: Vec<_> = self.base.dag_path().cloned().into_iter().collect();
        self.base.subscribe_ancestors(services, &occurrences);
    }

    fn get(&self, host: &dyn HostScene, _services: &SyncServices, key: &str) -> Option<AttrValue> {
        self.base.live_node(host)?;
        match key {
            keys::TRANSFORM => Some(AttrValue::Matrix(self.world)),
            keys::VISIBILITY => Some(AttrValue::Bool(host.is_visible(self.base.dag_path()?))),
            _ => None,
        }
    }

    fn dirty_bits_for_attribute(&self, attribute: &str, from_ancestor: bool) -> DirtyBits {
        match attribute {
            "matrix" => DirtyBits::TRANSFORM,
            "visibility" => DirtyBits::VISIBILITY,
            _ if from_ancestor => DirtyBits::CLEAN,
            _ => DirtyBits::PARAMS,
        }
    }
}
