//! Sync inspector
//!
//! Builds a small host scene, syncs it, then replays a scripted editing
//! session (instancing, rename, material change, delete) with one tick per
//! step, printing the render graph after each.
//!
//! Usage: `sync_inspector [config.toml|config.ron]`

use scene_sync::adapter::{keys, register_builtin_adapters, AdapterRegistry};
use scene_sync::config::{Config, ConfigError, SyncConfig};
use scene_sync::foundation::logging;
use scene_sync::foundation::math::{Transform, Vec3};
use scene_sync::host::{AttrValue, HostError, MemoryScene, NodeHandle};
use scene_sync::render::MemoryRenderIndex;
use scene_sync::scene::{FrameContext, SyncContext, TickReport};
use std::sync::Arc;

/// Inspector failures
#[derive(thiserror::Error, Debug)]
enum InspectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scene edit failed: {0}")]
    Host(#[from] HostError),

    #[error("Node not found: {0}")]
    MissingNode(String),
}

struct Inspector {
    scene: MemoryScene,
    sync: SyncContext,
    frame: u64,
}

impl Inspector {
    fn new(config: SyncConfig) -> Self {
        let registry = Arc::new(AdapterRegistry::new());
        register_builtin_adapters(&registry);
        Self {
            scene: MemoryScene::new(),
            sync: SyncContext::new(registry, Box::new(MemoryRenderIndex::new()), config),
            frame: 0,
        }
    }

    fn node(&self, path: &str) -> Result<NodeHandle, InspectorError> {
        self.scene
            .find(path)
            .ok_or_else(|| InspectorError::MissingNode(path.to_string()))
    }

    fn build_scene(&mut self) -> Result<(), InspectorError> {
        let root = self.scene.create_dag_node("root", &["transform"], None)?;
        let grp = self.scene.create_dag_node("grp", &["transform"], Some(root))?;
        self.scene.create_dag_node("cube1", &["mesh"], Some(grp))?;
        let left = self.scene.create_dag_node("left", &["transform"], Some(root))?;
        self.scene.create_dag_node("right", &["transform"], Some(root))?;
        let sphere = self.scene.create_dag_node("sphere", &["mesh"], Some(left))?;
        self.scene.create_dag_node("key", &["pointLight", "light"], Some(root))?;
        let glass = self.scene.create_dependency_node("glass", &["blinn", "lambert"]);

        self.scene
            .set_local_transform(
                left,
                Transform::from_position(Vec3::new(-2.0, 0.0, 0.0)).to_matrix(),
            )?;
        self.scene.bind_material(sphere, Some(glass))?;
        self.scene.take_events();
        Ok(())
    }

    fn step(&mut self, label: &str) -> TickReport {
        let events = self.scene.take_events();
        self.sync.notify_all(&events);
        self.frame += 1;
        let report = self.sync.tick(&self.scene, &FrameContext::new(self.frame));
        log::info!("{label}: {report:?}");
        self.dump(label);
        report
    }

    fn dump(&self, label: &str) {
        println!("== {label} (frame {})", self.frame);
        let index = self.sync.render_index();
        for path in index.entity_paths() {
            let tag = index.entity(&path).map_or("?", |e| e.type_tag.as_str());
            let bits = self.sync.change_tracker().dirty_bits(&path).unwrap_or_default();
            println!("  {path:<32} {tag:<14} {bits:?}");
        }
        let hub = self.sync.services().hub();
        for path in self.sync.adapter_paths() {
            let callbacks = hub.count_owned_by(path);
            match self.sync.get(&self.scene, path, keys::INSTANCE_INDICES) {
                Some(AttrValue::IntArray(indices)) => {
                    println!("  adapter {path} ({callbacks} callbacks) instances {indices:?}");
                }
                _ => println!("  adapter {path} ({callbacks} callbacks)"),
            }
        }
    }

    fn run(&mut self) -> Result<(), InspectorError> {
        self.build_scene()?;
        let created = self.sync.populate_all(&self.scene);
        log::info!("Populated {created} adapters");
        self.dump("populate");
        self.sync.change_tracker_mut().mark_all_clean();

        let sphere = self.node("/root/left/sphere")?;
        let right = self.node("/root/right")?;
        self.scene.add_parent(sphere, right)?;
        self.step("instance sphere under right");

        let selection: Vec<_> = ["/root/left", "/root/right/sphere", "/root/grp"]
            .iter()
            .filter_map(|p| self.scene.dag_path(p))
            .collect();
        let selected = self.sync.populate_selected_paths(&self.scene, &selection);
        for (path, indices) in selected.entries() {
            println!("  selected {path} {indices:?}");
        }

        let grp = self.node("/root/grp")?;
        self.scene.rename(grp, "group")?;
        self.step("rename grp");

        let glass = self
            .scene
            .find_dependency("glass")
            .ok_or_else(|| InspectorError::MissingNode("glass".to_string()))?;
        self.scene.set_attribute(glass, "opacity", AttrValue::Float(0.5))?;
        self.step("make glass translucent");

        self.scene.remove_parent(sphere, right)?;
        self.step("remove sphere instance");

        let cube = self.node("/root/group/cube1")?;
        self.scene.delete_node(cube)?;
        self.step("delete cube1");

        log::info!(
            "{} adapters, {} entities after {} frames",
            self.sync.adapter_count(),
            self.sync.render_index().entity_count(),
            self.frame
        );
        Ok(())
    }
}

fn load_config() -> Result<SyncConfig, InspectorError> {
    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::load_from_file(&path)?,
        None => SyncConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_filter(&config.log_filter);
    log::info!("Starting sync inspector");

    let mut inspector = Inspector::new(config);
    if let Err(e) = inspector.run() {
        log::error!("Inspector failed: {e}");
        return Err(e.into());
    }
    Ok(())
}
