//! Scenario tests driving a [`MemoryScene`] through a [`SyncContext`]

mod instancing;
mod selection;

use crate::adapter::{register_builtin_adapters, AdapterRegistry};
use crate::config::SyncConfig;
use crate::host::MemoryScene;
use crate::render::{MemoryRenderIndex, RenderIndex};
use crate::scene::{EntityPath, FrameContext, SyncContext, TickReport};
use std::sync::Arc;

/// Host scene plus context, with editor events forwarded on every flush
pub(super) struct Harness {
    pub scene: MemoryScene,
    pub ctx: SyncContext,
    frame: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_index(config, MemoryRenderIndex::new())
    }

    pub fn with_index(config: SyncConfig, index: MemoryRenderIndex) -> Self {
        let registry = Arc::new(AdapterRegistry::new());
        register_builtin_adapters(&registry);
        Self {
            scene: MemoryScene::new(),
            ctx: SyncContext::new(registry, Box::new(index), config),
            frame: 0,
        }
    }

    /// Full population; events recorded while building the scene are dropped
    pub fn populate(&mut self) -> usize {
        self.scene.take_events();
        self.ctx.populate_all(&self.scene)
    }

    /// Forward pending events and run one tick
    pub fn flush(&mut self) -> TickReport {
        let events = self.scene.take_events();
        self.ctx.notify_all(&events);
        self.tick()
    }

    pub fn tick(&mut self) -> TickReport {
        self.frame += 1;
        self.ctx.tick(&self.scene, &FrameContext::new(self.frame))
    }

    pub fn entity_count(&self) -> usize {
        self.ctx.render_index().entity_count()
    }

    pub fn has_entity(&self, p: &str) -> bool {
        self.ctx.render_index().contains(&path(p))
    }
}

pub(super) fn path(text: &str) -> EntityPath {
    EntityPath::parse(text).unwrap()
}
