//! Entity paths
//!
//! Deterministic hierarchical identifiers for render entities, derived from
//! a source node's position in the host DAG. Every component is a valid
//! identifier (`[A-Za-z_][A-Za-z0-9_]*`); host names are sanitised on the
//! way in.

use super::SyncError;
use crate::host::{DagPath, HostScene};
use std::fmt;

/// Absolute path of a render entity (e.g. `/root/grp/cubeShape`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityPath(String);

impl EntityPath {
    /// The absolute root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse an absolute path, validating every component
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        if text == "/" {
            return Ok(Self::root());
        }
        if !text.starts_with('/') || text.ends_with('/') {
            return Err(SyncError::InvalidPath(text.to_string()));
        }
        if text[1..].split('/').any(|c| !is_identifier(c)) {
            return Err(SyncError::InvalidPath(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    /// Derive the path of one DAG occurrence under `prefix`.
    ///
    /// Returns `None` when any node along the occurrence is stale.
    pub fn from_dag(host: &dyn HostScene, dag: &DagPath, prefix: &Self) -> Option<Self> {
        let mut path = prefix.clone();
        for node in dag.nodes() {
            path = path.child(&host.name(*node)?);
        }
        Some(path)
    }

    /// Append one component, sanitising it into an identifier
    pub fn child(&self, name: &str) -> Self {
        let name = sanitize_identifier(name);
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// Parent path; `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Last component; empty for the root
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Whether this is `/`
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Whether `self` equals `prefix` or lies below it
    pub fn has_prefix(&self, prefix: &Self) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/')
    }

    /// Path components below the root
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// The path text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map an arbitrary host name onto a path identifier
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
