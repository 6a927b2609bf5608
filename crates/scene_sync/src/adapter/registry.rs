//! Adapter registry
//!
//! Maps node type signatures to adapter factories. The registry is built
//! once at startup and shared (`Arc`) between the sync context and any
//! plugin code that registers extra adapters, so registration goes through
//! `&self` with interior locking.

use super::{Adapter, AdapterSeed};
use crate::host::{HostScene, NodeType};
use crate::scene::SyncError;
use log::{debug, error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Builds an adapter for a node of the registered type
pub type AdapterFactory = Arc<dyn Fn(AdapterSeed) -> Box<dyn Adapter> + Send + Sync>;

/// Wrap a constructor as an [`AdapterFactory`]
pub fn adapter_factory<A, F>(build: F) -> AdapterFactory
where
    A: Adapter + 'static,
    F: Fn(AdapterSeed) -> A + Send + Sync + 'static,
{
    Arc::new(move |seed| Box::new(build(seed)) as Box<dyn Adapter>)
}

/// Deferred registration hook run the first time a lookup misses
pub type PluginLoader = Box<dyn FnOnce(&AdapterRegistry) + Send>;

/// Type signature → factory table
#[derive(Default)]
pub struct AdapterRegistry {
    factories: RwLock<HashMap<NodeType, AdapterFactory>>,
    plugin_loader: Mutex<Option<PluginLoader>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut types: Vec<&str> = factories.keys().map(NodeType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("AdapterRegistry").field("types", &types).finish()
    }
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `node_type`.
    ///
    /// A second registration for the same type is a coding error: it is
    /// logged and rejected, and the first factory stays in place.
    pub fn register(&self, node_type: NodeType, factory: AdapterFactory) -> Result<(), SyncError> {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&node_type) {
            let err = SyncError::DuplicateRegistration(node_type);
            error!("{err}");
            return Err(err);
        }
        debug!("Registered adapter factory for {node_type}");
        factories.insert(node_type, factory);
        Ok(())
    }

    /// Install the hook that loads plugin adapters on the first miss
    pub fn set_plugin_loader(&self, loader: impl FnOnce(&AdapterRegistry) + Send + 'static) {
        *self.plugin_loader.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(loader));
    }

    /// Whether a factory is registered for exactly `node_type`
    pub fn has_factory(&self, node_type: &NodeType) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(node_type)
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no factory is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most specific factory for a type lineage (most derived type first)
    pub fn resolve(&self, lineage: &[NodeType]) -> Option<(NodeType, AdapterFactory)> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        lineage
            .iter()
            .find_map(|ty| factories.get(ty).map(|f| (ty.clone(), Arc::clone(f))))
    }

    /// Resolve, running the plugin loader once if nothing matches
    pub fn resolve_or_load(&self, lineage: &[NodeType]) -> Option<(NodeType, AdapterFactory)> {
        if let Some(found) = self.resolve(lineage) {
            return Some(found);
        }
        let loader = self
            .plugin_loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let loader = loader?;
        debug!("No adapter for {:?}, running plugin loader", lineage.first().map(NodeType::as_str));
        loader(self);
        self.resolve(lineage)
    }

    /// Build an adapter for `seed.node`.
    ///
    /// `None` means "node type unsupported"; the caller skips the node.
    pub fn create_for(&self, host: &dyn HostScene, seed: AdapterSeed) -> Option<Box<dyn Adapter>> {
        let lineage = host.type_lineage(seed.node);
        let Some((matched, factory)) = self.resolve_or_load(&lineage) else {
            let ty = lineage.first().map_or_else(String::new, |t| t.to_string());
            debug!("{}", SyncError::LookupFailure(ty));
            return None;
        };
        if lineage.first() != Some(&matched) {
            debug!("{} falls back to the {matched} adapter", seed.path);
        }
        Some(factory(seed))
    }
}
