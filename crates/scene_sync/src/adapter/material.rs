//! Material adapter
//!
//! Materials are dependency nodes, so their entities live under the
//! configured material scope instead of a DAG-derived path.

use super::{keys, Adapter, AdapterBase, AdapterKind, AdapterSeed};
use crate::events::{CallbackAction, SceneEventKind};
use crate::host::{AttrValue, HostScene, NodeHandle};
use crate::render::{DirtyBits, EntityKind};
use crate::scene::SyncServices;

const MATERIAL_TAG: &str = "material";

/// Translucency classification used to sort entities into render passes
pub const TAG_OPAQUE: &str = "opaque";
/// See [`TAG_OPAQUE`]
pub const TAG_TRANSLUCENT: &str = "translucent";

/// Adapter for material nodes
#[derive(Debug)]
pub struct MaterialAdapter {
    base: AdapterBase,
    tag: &'static str,
}

impl MaterialAdapter {
    /// Material adapter for `seed.node`
    pub fn new(seed: AdapterSeed) -> Self {
        Self {
            base: AdapterBase::new(seed),
            tag: TAG_OPAQUE,
        }
    }

    /// Classify a material node as opaque or translucent
    pub fn classify(host: &dyn HostScene, node: NodeHandle) -> &'static str {
        let transparency = host
            .attribute(node, "transparency")
            .and_then(|v| v.as_vec3().map(|c| c.max()).or_else(|| v.as_float()))
            .unwrap_or(0.0);
        let opacity = host
            .attribute(node, "opacity")
            .and_then(|v| v.as_vec3().map(|c| c.min()).or_else(|| v.as_float()))
            .unwrap_or(1.0);
        if transparency > 0.0 || opacity < 1.0 {
            TAG_TRANSLUCENT
        } else {
            TAG_OPAQUE
        }
    }
}

impl Adapter for MaterialAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AdapterBase {
        &mut self.base
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Material
    }

    fn type_tag(&self) -> &str {
        MATERIAL_TAG
    }

    fn populate(&mut self, host: &dyn HostScene, services: &mut SyncServices) -> bool {
        if !self.base.insert_primary(services, EntityKind::Sprim, MATERIAL_TAG) {
            return false;
        }
        self.tag = Self::classify(host, self.base.node());
        true
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
    }

    fn get(&self, host: &dyn HostScene, _services: &SyncServices, key: &str) -> Option<AttrValue> {
        let node = self.base.live_node(host)?;
        match key {
            keys::MATERIAL_TAG => Some(AttrValue::String(Self::classify(host, node).to_string())),
            _ => None,
        }
    }

    fn dirty_bits_for_attribute(&self, _attribute: &str, _from_ancestor: bool) -> DirtyBits {
        DirtyBits::PARAMS
    }

    fn affects_material_tag(&self, attribute: &str) -> bool {
        matches!(attribute, "transparency" | "opacity")
    }

    fn reclassify(&mut self, host: &dyn HostScene) -> bool {
        let Some(node) = self.base.live_node(host) else {
            return false;
        };
        let tag = Self::classify(host, node);
        if tag == self.tag {
            return false;
        }
        self.tag = tag;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::foundation::math::Vec3;
    use crate::host::MemoryScene;
    use crate::render::MemoryRenderIndex;

    #[test]
    fn test_classify_and_tag_attributes() {
        let mut scene = MemoryScene::new();
        let glass = scene.create_dependency_node("glass", &["standardSurface"]);
        let services =
            SyncServices::new(Box::new(MemoryRenderIndex::new()), &SyncConfig::default());
        let path = services.material_path(&scene, glass).unwrap();
        assert_eq!(path.as_str(), "/_materials/glass");

        let adapter = MaterialAdapter::new(AdapterSeed {
            node: glass,
            dag_path: None,
            path,
        });
        assert_eq!(
            adapter.get(&scene, &services, keys::MATERIAL_TAG),
            Some(AttrValue::String(TAG_OPAQUE.to_string()))
        );

        scene
            .set_attribute(glass, "transparency", AttrValue::Vec3(Vec3::new(0.0, 0.5, 0.0)))
            .unwrap();
        assert_eq!(MaterialAdapter::classify(&scene, glass), TAG_TRANSLUCENT);
        assert!(adapter.affects_material_tag("opacity"));
        assert!(!adapter.affects_material_tag("color"));
    }

    #[test]
    fn test_reclassify_reports_only_class_flips() {
        let mut scene = MemoryScene::new();
        let glass = scene.create_dependency_node("glass", &["standardSurface"]);
        let mut services =
            SyncServices::new(Box::new(MemoryRenderIndex::new()), &SyncConfig::default());
        let path = services.material_path(&scene, glass).unwrap();
        let mut adapter = MaterialAdapter::new(AdapterSeed {
            node: glass,
            dag_path: None,
            path,
        });
        assert!(adapter.populate(&scene, &mut services));
        assert!(!adapter.reclassify(&scene));

        scene.set_attribute(glass, "opacity", AttrValue::Float(0.4)).unwrap();
        assert!(adapter.reclassify(&scene));

        scene.set_attribute(glass, "opacity", AttrValue::Float(0.5)).unwrap();
        assert!(!adapter.reclassify(&scene));

        scene.set_attribute(glass, "opacity", AttrValue::Float(1.0)).unwrap();
        assert!(adapter.reclassify(&scene));
    }
}
