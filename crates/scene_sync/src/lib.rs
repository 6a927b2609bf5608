//! # Scene Sync
//!
//! Incremental synchronisation of a live, host-owned scene graph into a
//! render graph of discrete, dirty-tracked entities.
//!
//! ## Features
//!
//! - **Adapter Registry**: Node type → adapter factory, with base-type fallback
//! - **Deferred Work**: Host notifications are queued and coalesced between ticks
//! - **Instancing**: Shapes with several DAG occurrences share one master entity
//! - **Selection**: Host selections map to entity paths plus instance indices
//! - **Stale-Safe**: Every node handle is re-validated before use
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_sync::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(AdapterRegistry::new());
//! register_builtin_adapters(&registry);
//!
//! let mut scene = MemoryScene::new();
//! let root = scene.create_dag_node("root", &["transform"], None).unwrap();
//! let cube = scene.create_dag_node("cube1", &["mesh"], Some(root)).unwrap();
//! scene.take_events();
//!
//! let index = Box::new(MemoryRenderIndex::new());
//! let mut sync = SyncContext::new(registry, index, SyncConfig::default());
//! assert_eq!(sync.populate_all(&scene), 1);
//!
//! let path = EntityPath::parse("/root/cube1").unwrap();
//! assert!(sync.lookup_adapter(&path).is_some());
//!
//! scene.delete_node(cube).unwrap();
//! for event in scene.take_events() {
//!     sync.notify(&event);
//! }
//! sync.tick(&scene, &FrameContext::new(1));
//! assert!(sync.lookup_adapter(&path).is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod host;
pub mod events;
pub mod render;
pub mod adapter;
pub mod scene;

/// Common imports for users of the sync layer
pub mod prelude {
    pub use crate::{
        adapter::{
            keys, register_builtin_adapters, Adapter, AdapterFactory, AdapterKind,
            AdapterRegistry, AdapterSeed,
        },
        config::{Config, SyncConfig},
        events::{SceneEvent, SceneEventKind},
        foundation::math::{Mat4, Transform, Vec3},
        host::{AttrValue, DagPath, HostScene, MemoryScene, NodeHandle, NodeType},
        render::{ChangeTracker, DirtyBits, MemoryRenderIndex, RebuildFlags, RenderIndex},
        scene::{EntityPath, FrameContext, SelectionResult, SyncContext, SyncError, TickReport},
    };
}
