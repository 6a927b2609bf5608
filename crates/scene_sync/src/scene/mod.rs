//! Scene synchronisation
//!
//! Keeps the render graph consistent with the host scene through explicit,
//! incremental ticks.
//!
//! ## Architecture
//!
//! ```text
//! Host scene (editor-owned DAG)
//!      ↓  SceneEvent (enqueue only)
//! DeferredQueues
//!      ↓  SyncContext::tick (once per frame)
//! Adapters ──> RenderIndex + ChangeTracker
//! ```
//!
//! The context:
//! - Creates one adapter per supported node through the registry
//! - Coalesces recreate / rebuild / dirty requests between ticks
//! - Collapses multiple occurrences of a shape into one instanced master
//! - Maps host selections onto render entities

mod entity_path;
mod error;
pub mod instancing;
mod queues;
mod selection;
mod sync_context;

#[cfg(test)]
mod tests;

pub use entity_path::{sanitize_identifier, EntityPath};
pub use error::SyncError;
pub use instancing::{InstanceRecord, InstanceTracker, OccurrenceChange};
pub use queues::DeferredQueues;
pub use selection::{SelectionMapper, SelectionResult, SelectionState};
pub use sync_context::{FrameContext, SyncContext, SyncServices, TickReport};
