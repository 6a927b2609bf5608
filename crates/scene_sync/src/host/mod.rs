//! Native scene graph seam
//!
//! The host application owns a live, mutable DAG of named nodes. This
//! module describes the read-only view the synchronisation layer needs of
//! it. Nothing here holds an owning reference to a host node: every access
//! goes through a [`NodeHandle`] that must be re-validated immediately
//! before use.
//!
//! ```text
//! Host editor (owns nodes)
//!      ↓  HostScene (read-only queries)
//! SyncContext (holds NodeHandles only)
//! ```

mod memory;

pub use memory::MemoryScene;

use crate::foundation::math::{compose_world, Mat4, Vec3};
use slotmap::Key;
use std::fmt;

slotmap::new_key_type! {
    /// Weak, generational reference to a host node.
    ///
    /// A handle to a destroyed node never validates again, even when the
    /// host reuses the underlying slot.
    pub struct NodeHandle;
}

impl NodeHandle {
    /// Whether this is the "no node" handle
    pub fn is_none(&self) -> bool {
        self.is_null()
    }
}

/// Type signature of a host node (e.g. `"mesh"`, `"pointLight"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeType(String);

impl NodeType {
    /// Create a node type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One occurrence of a DAG node: the chain of handles from a root to it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DagPath {
    nodes: Vec<NodeHandle>,
}

impl DagPath {
    /// Path consisting of a single root node
    pub fn root(node: NodeHandle) -> Self {
        Self { nodes: vec![node] }
    }

    /// Build a path from root-to-leaf handles
    pub fn from_nodes(nodes: Vec<NodeHandle>) -> Self {
        Self { nodes }
    }

    /// Extend this path by one child
    pub fn child(&self, node: NodeHandle) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Self { nodes }
    }

    /// The node this path ends at
    pub fn leaf(&self) -> Option<NodeHandle> {
        self.nodes.last().copied()
    }

    /// Handles from root to leaf
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Handles strictly above the leaf, root first
    pub fn ancestors(&self) -> &[NodeHandle] {
        match self.nodes.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Number of nodes in the path
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the path has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `self` is a strict ancestor occurrence of `other`
    pub fn is_ancestor_of(&self, other: &DagPath) -> bool {
        self.nodes.len() < other.nodes.len() && other.nodes.starts_with(&self.nodes)
    }
}

/// Attribute or pulled value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Scalar value
    Float(f64),
    /// String or token value
    String(String),
    /// 3-vector (positions, colors)
    Vec3(Vec3),
    /// Array of 3-vectors (points)
    Vec3Array(Vec<Vec3>),
    /// 4x4 matrix
    Matrix(Mat4),
    /// Array of 4x4 matrices
    MatrixArray(Vec<Mat4>),
    /// Array of integers
    IntArray(Vec<i64>),
}

impl AttrValue {
    /// Interpret the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Interpret the value as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Interpret the value as a 3-vector
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

/// Errors raised by host editing operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Handle does not refer to a live node
    #[error("Invalid node handle: {0:?}")]
    InvalidHandle(NodeHandle),

    /// A sibling with the same name already exists
    #[error("Duplicate sibling name: {0}")]
    DuplicateName(String),

    /// Operation requires a DAG node
    #[error("Node is not part of the DAG: {0}")]
    NotDag(String),

    /// Operation would create a cycle
    #[error("Parenting {child} under {parent} would create a cycle")]
    Cycle {
        /// Child node name
        child: String,
        /// Parent node name
        parent: String,
    },
}

/// Read-only view of the host's native scene graph.
///
/// Every method must tolerate stale handles by returning an empty result.
pub trait HostScene {
    /// Whether `node` still refers to a live node
    fn is_valid(&self, node: NodeHandle) -> bool;

    /// Node name, unique among siblings
    fn name(&self, node: NodeHandle) -> Option<String>;

    /// Runtime type followed by its base types, most derived first
    fn type_lineage(&self, node: NodeHandle) -> Vec<NodeType>;

    /// Whether the node lives in the DAG hierarchy
    fn is_dag(&self, node: NodeHandle) -> bool;

    /// Direct parents, in the order they were attached
    fn parents(&self, node: NodeHandle) -> Vec<NodeHandle>;

    /// Direct children, in creation order
    fn children(&self, node: NodeHandle) -> Vec<NodeHandle>;

    /// DAG nodes without parents
    fn roots(&self) -> Vec<NodeHandle>;

    /// Live nodes outside the DAG (materials and other dependency nodes)
    fn dependency_nodes(&self) -> Vec<NodeHandle>;

    /// Local transform relative to the parent
    fn local_transform(&self, node: NodeHandle) -> Option<Mat4>;

    /// Named attribute value
    fn attribute(&self, node: NodeHandle, name: &str) -> Option<AttrValue>;

    /// Material bound to a shape node
    fn material_binding(&self, node: NodeHandle) -> Option<NodeHandle>;

    /// Every occurrence of `node` in the DAG, root-to-leaf.
    ///
    /// Order follows parent attachment order, so the first path is stable
    /// for as long as the first parent link survives.
    fn dag_paths(&self, node: NodeHandle) -> Vec<DagPath> {
        if !self.is_valid(node) || !self.is_dag(node) {
            return Vec::new();
        }
        let parents = self.parents(node);
        if parents.is_empty() {
            return vec![DagPath::root(node)];
        }
        parents
            .into_iter()
            .flat_map(|parent| self.dag_paths(parent))
            .map(|path| path.child(node))
            .collect()
    }

    /// World transform of one occurrence
    fn world_transform(&self, path: &DagPath) -> Option<Mat4> {
        let locals: Option<Vec<Mat4>> = path
            .nodes()
            .iter()
            .map(|node| self.local_transform(*node))
            .collect();
        locals.map(compose_world)
    }

    /// An occurrence is visible when no node along it is hidden
    fn is_visible(&self, path: &DagPath) -> bool {
        path.nodes().iter().all(|node| {
            self.is_valid(*node)
                && self
                    .attribute(*node, "visibility")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true)
        })
    }
}
