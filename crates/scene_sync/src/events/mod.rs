//! Host scene-edit notifications and adapter subscriptions
//!
//! Key principles:
//! - Subscriptions are keyed by the host node that emits the event
//! - Each subscription carries its client data as a typed [`CallbackAction`]
//! - Subscription ids are generational: once unsubscribed, an id never
//!   matches again, even if its slot is reused
//! - Matching never mutates anything; the caller decides how to queue work

use crate::host::NodeHandle;
use crate::render::{DirtyBits, RebuildFlags};
use crate::scene::EntityPath;
use slotmap::SlotMap;
use std::collections::HashMap;

/// Kind of host scene-edit notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEventKind {
    /// A node was created
    NodeAdded,
    /// A node is about to be destroyed
    NodePreRemoval,
    /// A node's name changed
    NodeRenamed,
    /// A connection on the node changed (e.g. material binding)
    ConnectionChanged,
    /// An attribute value changed
    AttributeChanged,
    /// A parent link was added to or removed from the node
    HierarchyChanged,
}

/// Notification emitted by the host editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEvent {
    /// Type of event
    pub kind: SceneEventKind,
    /// Node the event refers to
    pub node: NodeHandle,
    /// Attribute name for [`SceneEventKind::AttributeChanged`]
    pub attribute: Option<String>,
}

impl SceneEvent {
    /// Create a new event
    pub fn new(kind: SceneEventKind, node: NodeHandle) -> Self {
        Self {
            kind,
            node,
            attribute: None,
        }
    }

    /// Attach the changed attribute name (builder pattern)
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// What a subscription asks the sync context to queue when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Accumulate fixed dirty bits for the owning entity
    MarkDirty(DirtyBits),
    /// Ask the owning adapter which bits the changed attribute affects
    AttributeDirty,
    /// Destroy and recreate the owning adapter from its node
    Recreate,
    /// Destroy the owning adapter without replacement
    Remove,
    /// Re-run parts of the owning adapter's setup
    Rebuild(RebuildFlags),
}

slotmap::new_key_type! {
    /// Generational handle to one installed subscription
    pub struct SubscriptionId;
}

#[derive(Debug, Clone)]
struct Subscription {
    source: NodeHandle,
    kind: SceneEventKind,
    owner: EntityPath,
    target: NodeHandle,
    action: CallbackAction,
}

/// A matched subscription, ready to be turned into deferred work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Entity path of the adapter that installed the subscription
    pub owner: EntityPath,
    /// The adapter's own node (the replacement handle for recreates)
    pub target: NodeHandle,
    /// Requested action
    pub action: CallbackAction,
    /// Changed attribute, when the event carried one
    pub attribute: Option<String>,
    /// Whether the event came from an ancestor rather than the node itself
    pub from_ancestor: bool,
}

/// Subscription table shared by all adapters of one sync context
#[derive(Debug, Default)]
pub struct EventHub {
    subscriptions: SlotMap<SubscriptionId, Subscription>,
    by_source: HashMap<NodeHandle, Vec<SubscriptionId>>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a subscription for `kind` events emitted by `source`
    pub fn subscribe(
        &mut self,
        source: NodeHandle,
        kind: SceneEventKind,
        owner: &EntityPath,
        target: NodeHandle,
        action: CallbackAction,
    ) -> SubscriptionId {
        let id = self.subscriptions.insert(Subscription {
            source,
            kind,
            owner: owner.clone(),
            target,
            action,
        });
        self.by_source.entry(source).or_default().push(id);
        id
    }

    /// Remove a subscription. Returns false for ids already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.subscriptions.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_source.get_mut(&sub.source) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_source.remove(&sub.source);
            }
        }
        true
    }

    /// Collect every live subscription matching `event`, in install order
    pub fn matching(&self, event: &SceneEvent) -> Vec<Delivery> {
        let Some(ids) = self.by_source.get(&event.node) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.subscriptions.get(*id))
            .filter(|sub| sub.kind == event.kind)
            .map(|sub| Delivery {
                owner: sub.owner.clone(),
                target: sub.target,
                action: sub.action,
                attribute: event.attribute.clone(),
                from_ancestor: sub.source != sub.target,
            })
            .collect()
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscriptions are installed
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of live subscriptions owned by `owner`
    pub fn count_owned_by(&self, owner: &EntityPath) -> usize {
        self.subscriptions
            .values()
            .filter(|sub| &sub.owner == owner)
            .count()
    }
}
