//! In-memory host scene
//!
//! A small editable DAG used by tests and tooling. Every edit records the
//! notification a real host would emit; drain them with
//! [`MemoryScene::take_events`] and forward them to the sync context.

use super::{AttrValue, DagPath, HostError, HostScene, NodeHandle, NodeType};
use crate::events::{SceneEvent, SceneEventKind};
use crate::foundation::math::Mat4;
use slotmap::SlotMap;
use std::collections::HashMap;

#[derive(Debug)]
struct MemoryNode {
    name: String,
    lineage: Vec<NodeType>,
    dag: bool,
    parents: Vec<NodeHandle>,
    children: Vec<NodeHandle>,
    local: Mat4,
    attributes: HashMap<String, AttrValue>,
    material: Option<NodeHandle>,
}

/// Editable in-memory implementation of [`HostScene`]
#[derive(Debug, Default)]
pub struct MemoryScene {
    nodes: SlotMap<NodeHandle, MemoryNode>,
    roots: Vec<NodeHandle>,
    dependency: Vec<NodeHandle>,
    events: Vec<SceneEvent>,
}

impl MemoryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DAG node under `parent` (or as a root)
    ///
    /// `lineage` lists the node type first, then its base types.
    pub fn create_dag_node(
        &mut self,
        name: &str,
        lineage: &[&str],
        parent: Option<NodeHandle>,
    ) -> Result<NodeHandle, HostError> {
        if let Some(parent) = parent {
            self.check_dag(parent)?;
        }
        self.check_unique_name(parent, name)?;

        let node = self.nodes.insert(MemoryNode {
            name: name.to_string(),
            lineage: lineage.iter().map(|t| NodeType::new(*t)).collect(),
            dag: true,
            parents: parent.into_iter().collect(),
            children: Vec::new(),
            local: Mat4::identity(),
            attributes: HashMap::new(),
            material: None,
        });

        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.push(node);
                }
            }
            None => self.roots.push(node),
        }

        self.emit(SceneEvent::new(SceneEventKind::NodeAdded, node));
        Ok(node)
    }

    /// Create a node outside the DAG, such as a material
    pub fn create_dependency_node(&mut self, name: &str, lineage: &[&str]) -> NodeHandle {
        let node = self.nodes.insert(MemoryNode {
            name: name.to_string(),
            lineage: lineage.iter().map(|t| NodeType::new(*t)).collect(),
            dag: false,
            parents: Vec::new(),
            children: Vec::new(),
            local: Mat4::identity(),
            attributes: HashMap::new(),
            material: None,
        });
        self.dependency.push(node);
        self.emit(SceneEvent::new(SceneEventKind::NodeAdded, node));
        node
    }

    /// Attach `node` under an additional parent, creating a new occurrence
    pub fn add_parent(&mut self, node: NodeHandle, parent: NodeHandle) -> Result<(), HostError> {
        self.check_dag(node)?;
        self.check_dag(parent)?;
        let name = self.node(node)?.name.clone();

        if node == parent || self.is_ancestor(node, parent) {
            return Err(HostError::Cycle {
                child: name,
                parent: self.node(parent)?.name.clone(),
            });
        }
        self.check_unique_name(Some(parent), &name)?;

        let was_root = self.node(node)?.parents.is_empty();
        if let Some(n) = self.nodes.get_mut(node) {
            n.parents.push(parent);
        }
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(node);
        }
        if was_root {
            self.roots.retain(|r| *r != node);
        }

        self.emit(SceneEvent::new(SceneEventKind::HierarchyChanged, node));
        Ok(())
    }

    /// Detach `node` from one parent.
    ///
    /// A node left without parents is deleted, matching how DAG hosts
    /// treat their last instance.
    pub fn remove_parent(&mut self, node: NodeHandle, parent: NodeHandle) -> Result<(), HostError> {
        let remaining = {
            let n = self.node(node)?;
            if !n.parents.contains(&parent) {
                return Ok(());
            }
            n.parents.len() - 1
        };

        if remaining == 0 {
            return self.delete_node(node);
        }

        if let Some(n) = self.nodes.get_mut(node) {
            n.parents.retain(|p| *p != parent);
        }
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        self.emit(SceneEvent::new(SceneEventKind::HierarchyChanged, node));
        Ok(())
    }

    /// Delete a node.
    ///
    /// Children whose only parent is the deleted node are deleted with it;
    /// children with other parents only lose the link.
    pub fn delete_node(&mut self, node: NodeHandle) -> Result<(), HostError> {
        self.node(node)?;

        let mut doomed = Vec::new();
        self.collect_doomed(node, &mut doomed);

        for handle in &doomed {
            self.emit(SceneEvent::new(SceneEventKind::NodePreRemoval, *handle));
        }

        for handle in &doomed {
            let Some(removed) = self.nodes.remove(*handle) else {
                continue;
            };
            for parent in removed.parents {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|c| c != handle);
                }
            }
            for child in removed.children {
                if doomed.contains(&child) {
                    continue;
                }
                if let Some(c) = self.nodes.get_mut(child) {
                    c.parents.retain(|p| p != handle);
                    self.events
                        .push(SceneEvent::new(SceneEventKind::HierarchyChanged, child));
                }
            }
            let mut unbound = Vec::new();
            for (key, other) in &mut self.nodes {
                if other.material == Some(*handle) {
                    other.material = None;
                    if !doomed.contains(&key) {
                        unbound.push(key);
                    }
                }
            }
            for shape in unbound {
                self.emit(SceneEvent::new(SceneEventKind::ConnectionChanged, shape));
            }
        }

        self.roots.retain(|r| self.nodes.contains_key(*r));
        self.dependency.retain(|d| self.nodes.contains_key(*d));
        Ok(())
    }

    /// Rename a node
    pub fn rename(&mut self, node: NodeHandle, name: &str) -> Result<(), HostError> {
        let parents = self.node(node)?.parents.clone();
        if self.node(node)?.dag {
            if parents.is_empty() {
                self.check_unique_name(None, name)?;
            }
            for parent in parents {
                self.check_unique_name(Some(parent), name)?;
            }
        }

        if let Some(n) = self.nodes.get_mut(node) {
            n.name = name.to_string();
        }
        self.emit(SceneEvent::new(SceneEventKind::NodeRenamed, node));
        Ok(())
    }

    /// Set an attribute value
    pub fn set_attribute(
        &mut self,
        node: NodeHandle,
        name: &str,
        value: AttrValue,
    ) -> Result<(), HostError> {
        self.node_mut(node)?.attributes.insert(name.to_string(), value);
        self.emit(SceneEvent::new(SceneEventKind::AttributeChanged, node).with_attribute(name));
        Ok(())
    }

    /// Set the local transform of a DAG node
    pub fn set_local_transform(&mut self, node: NodeHandle, local: Mat4) -> Result<(), HostError> {
        self.check_dag(node)?;
        self.node_mut(node)?.local = local;
        self.emit(SceneEvent::new(SceneEventKind::AttributeChanged, node).with_attribute("matrix"));
        Ok(())
    }

    /// Bind a material to a shape (or clear the binding)
    pub fn bind_material(
        &mut self,
        shape: NodeHandle,
        material: Option<NodeHandle>,
    ) -> Result<(), HostError> {
        if let Some(material) = material {
            self.node(material)?;
        }
        self.node_mut(shape)?.material = material;
        self.emit(SceneEvent::new(SceneEventKind::ConnectionChanged, shape));
        Ok(())
    }

    /// Resolve a `/`-separated name path (e.g. `/root/cube1`) to its node
    pub fn find(&self, path: &str) -> Option<NodeHandle> {
        self.dag_path(path).and_then(|p| p.leaf())
    }

    /// Resolve a `/`-separated name path to the matching occurrence
    pub fn dag_path(&self, path: &str) -> Option<DagPath> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let first = components.next()?;
        let root = self
            .roots
            .iter()
            .copied()
            .find(|r| self.nodes.get(*r).is_some_and(|n| n.name == first))?;

        let mut dag = DagPath::root(root);
        for name in components {
            let current = dag.leaf()?;
            let next = self
                .nodes
                .get(current)?
                .children
                .iter()
                .copied()
                .find(|c| self.nodes.get(*c).is_some_and(|n| n.name == name))?;
            dag = dag.child(next);
        }
        Some(dag)
    }

    /// Find a dependency node by name
    pub fn find_dependency(&self, name: &str) -> Option<NodeHandle> {
        self.dependency
            .iter()
            .copied()
            .find(|d| self.nodes.get(*d).is_some_and(|n| n.name == name))
    }

    /// Drain the notifications recorded since the last call
    pub fn take_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn emit(&mut self, event: SceneEvent) {
        log::trace!("host event {:?} on {:?}", event.kind, event.node);
        self.events.push(event);
    }

    fn node(&self, node: NodeHandle) -> Result<&MemoryNode, HostError> {
        self.nodes.get(node).ok_or(HostError::InvalidHandle(node))
    }

    fn node_mut(&mut self, node: NodeHandle) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(node).ok_or(HostError::InvalidHandle(node))
    }

    fn check_dag(&self, node: NodeHandle) -> Result<(), HostError> {
        let n = self.node(node)?;
        if n.dag {
            Ok(())
        } else {
            Err(HostError::NotDag(n.name.clone()))
        }
    }

    fn check_unique_name(&self, parent: Option<NodeHandle>, name: &str) -> Result<(), HostError> {
        let siblings: &[NodeHandle] = match parent {
            Some(parent) => &self.node(parent)?.children,
            None => &self.roots,
        };
        if siblings
            .iter()
            .any(|s| self.nodes.get(*s).is_some_and(|n| n.name == name))
        {
            return Err(HostError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Whether `ancestor` appears above `node` in any occurrence
    fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let Some(n) = self.nodes.get(node) else {
            return false;
        };
        n.parents
            .iter()
            .any(|p| *p == ancestor || self.is_ancestor(ancestor, *p))
    }

    fn collect_doomed(&self, node: NodeHandle, doomed: &mut Vec<NodeHandle>) {
        if doomed.contains(&node) {
            return;
        }
        doomed.push(node);
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        for child in &n.children {
            let survives = self
                .nodes
                .get(*child)
                .is_some_and(|c| c.parents.iter().any(|p| !doomed.contains(p)));
            if !survives {
                self.collect_doomed(*child, doomed);
            }
        }
    }
}

impl HostScene for MemoryScene {
    fn is_valid(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(node)
    }

    fn name(&self, node: NodeHandle) -> Option<String> {
        self.nodes.get(node).map(|n| n.name.clone())
    }

    fn type_lineage(&self, node: NodeHandle) -> Vec<NodeType> {
        self.nodes
            .get(node)
            .map(|n| n.lineage.clone())
            .unwrap_or_default()
    }

    fn is_dag(&self, node: NodeHandle) -> bool {
        self.nodes.get(node).is_some_and(|n| n.dag)
    }

    fn parents(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(node)
            .map(|n| n.parents.clone())
            .unwrap_or_default()
    }

    fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn roots(&self) -> Vec<NodeHandle> {
        self.roots.clone()
    }

    fn dependency_nodes(&self) -> Vec<NodeHandle> {
        self.dependency.clone()
    }

    fn local_transform(&self, node: NodeHandle) -> Option<Mat4> {
        self.nodes.get(node).map(|n| n.local)
    }

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<AttrValue> {
        self.nodes.get(node)?.attributes.get(name).cloned()
    }

    fn material_binding(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes
            .get(node)?
            .material
            .filter(|m| self.nodes.contains_key(*m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[SceneEvent]) -> Vec<SceneEventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_create_and_find() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let cube = scene.create_dag_node("cube1", &["mesh"], Some(root)).unwrap();

        assert_eq!(scene.find("/root/cube1"), Some(cube));
        assert_eq!(scene.find("/root"), Some(root));
        assert_eq!(scene.find("/root/missing"), None);
        assert_eq!(
            kinds(&scene.take_events()),
            vec![SceneEventKind::NodeAdded, SceneEventKind::NodeAdded]
        );
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        scene.create_dag_node("a", &["transform"], Some(root)).unwrap();

        let result = scene.create_dag_node("a", &["transform"], Some(root));
        assert_eq!(result, Err(HostError::DuplicateName("a".to_string())));
    }

    #[test]
    fn test_instancing_creates_second_occurrence() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let x = scene.create_dag_node("x", &["transform"], Some(root)).unwrap();
        let y = scene.create_dag_node("y", &["transform"], Some(root)).unwrap();
        let shape = scene.create_dag_node("shape", &["mesh"], Some(x)).unwrap();
        scene.take_events();

        scene.add_parent(shape, y).unwrap();

        let paths = scene.dag_paths(shape);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].nodes(), &[root, x, shape]);
        assert_eq!(paths[1].nodes(), &[root, y, shape]);
        assert_eq!(kinds(&scene.take_events()), vec![SceneEventKind::HierarchyChanged]);
    }

    #[test]
    fn test_add_parent_rejects_cycle() {
        let mut scene = MemoryScene::new();
        let a = scene.create_dag_node("a", &["transform"], None).unwrap();
        let b = scene.create_dag_node("b", &["transform"], Some(a)).unwrap();

        assert!(matches!(scene.add_parent(a, b), Err(HostError::Cycle { .. })));
    }

    #[test]
    fn test_delete_cascades_to_orphans_only() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let grp = scene.create_dag_node("grp", &["transform"], Some(root)).unwrap();
        let other = scene.create_dag_node("other", &["transform"], Some(root)).unwrap();
        let only_child = scene.create_dag_node("only", &["mesh"], Some(grp)).unwrap();
        let shared = scene.create_dag_node("shared", &["mesh"], Some(grp)).unwrap();
        scene.add_parent(shared, other).unwrap();
        scene.take_events();

        scene.delete_node(grp).unwrap();

        assert!(!scene.is_valid(grp));
        assert!(!scene.is_valid(only_child));
        assert!(scene.is_valid(shared));
        assert_eq!(scene.dag_paths(shared).len(), 1);

        let events = scene.take_events();
        let removed: Vec<_> = events
            .iter()
            .filter(|e| e.kind == SceneEventKind::NodePreRemoval)
            .map(|e| e.node)
            .collect();
        assert_eq!(removed, vec![grp, only_child]);
        assert!(events
            .iter()
            .any(|e| e.kind == SceneEventKind::HierarchyChanged && e.node == shared));
    }

    #[test]
    fn test_deleting_material_unbinds_shapes() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let cube = scene.create_dag_node("cube", &["mesh"], Some(root)).unwrap();
        let glass = scene.create_dependency_node("glass", &["standardSurface"]);
        scene.bind_material(cube, Some(glass)).unwrap();
        scene.take_events();

        scene.delete_node(glass).unwrap();

        assert_eq!(scene.material_binding(cube), None);
        assert_eq!(
            kinds(&scene.take_events()),
            vec![SceneEventKind::NodePreRemoval, SceneEventKind::ConnectionChanged]
        );
    }

    #[test]
    fn test_removing_last_parent_deletes() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        let shape = scene.create_dag_node("shape", &["mesh"], Some(root)).unwrap();

        scene.remove_parent(shape, root).unwrap();
        assert!(!scene.is_valid(shape));
    }

    #[test]
    fn test_rename_and_attributes_emit_events() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        scene.take_events();

        scene.rename(root, "world").unwrap();
        scene.set_attribute(root, "visibility", AttrValue::Bool(false)).unwrap();

        let events = scene.take_events();
        assert_eq!(events[0].kind, SceneEventKind::NodeRenamed);
        assert_eq!(events[1].attribute.as_deref(), Some("visibility"));
        assert_eq!(scene.find("/world"), Some(root));
        assert!(!scene.is_visible(&DagPath::root(root)));
    }

    #[test]
    fn test_stale_handle_queries_are_empty() {
        let mut scene = MemoryScene::new();
        let root = scene.create_dag_node("root", &["transform"], None).unwrap();
        scene.delete_node(root).unwrap();

        assert!(!scene.is_valid(root));
        assert!(scene.name(root).is_none());
        assert!(scene.type_lineage(root).is_empty());
        assert!(scene.dag_paths(root).is_empty());
        assert!(scene.world_transform(&DagPath::root(root)).is_none());
    }
}
