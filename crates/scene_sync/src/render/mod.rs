//! Render-graph side of the bridge
//!
//! The synchronisation layer never renders. It decides which render
//! entities exist and which of their aspects are invalid:
//! - [`RenderIndex`]: insertion and removal against the backend's graph
//! - [`ChangeTracker`]: per-entity [`DirtyBits`] and collection versions
//! - [`RebuildFlags`]: deferred adapter rebuild requests

mod dirty;
mod change_tracker;
mod render_index;

pub use dirty::{DirtyBits, RebuildFlags};
pub use change_tracker::ChangeTracker;
pub use render_index::{EntityKind, MemoryRenderIndex, RenderEntity, RenderIndex};
