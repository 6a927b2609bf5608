//! Failure taxonomy of the synchronisation layer
//!
//! None of these cross the adapter, registry or context boundaries as
//! errors the caller must handle. They are logged where detected and
//! counted in the tick report; only registration surfaces one directly.

use crate::host::NodeType;
use thiserror::Error;

/// Synchronisation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No registered factory matches the node type
    #[error("No adapter factory for node type {0}")]
    LookupFailure(String),

    /// A queued request's node was destroyed before it could be processed
    #[error("Node handle for {0} is no longer valid")]
    StaleHandle(String),

    /// A second factory was registered for a type
    #[error("Adapter factory already registered for node type {0}")]
    DuplicateRegistration(NodeType),

    /// The adapter failed its support gate
    #[error("Adapter for {0} is not supported by the render index")]
    UnsupportedAdapter(String),

    /// An adapter already exists at the entity path
    #[error("An adapter already exists at {0}")]
    DuplicatePath(String),

    /// Text is not a valid entity path
    #[error("Invalid entity path: {0}")]
    InvalidPath(String),
}
