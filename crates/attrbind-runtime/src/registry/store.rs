#![forbid(unsafe_code)]

//! Instance store: node → (attribute name → live instance).
//!
//! # Design
//!
//! Entries are keyed by [`NodeId`] and hold only a weak handle to their node,
//! so the store never keeps a node alive. Node ids are never reused, which
//! means an entry left behind by a reclaimed node cannot be mistaken for a
//! newer node; [`InstanceStore::prune`] drops such entries.
//!
//! # Invariants
//!
//! 1. No entry is ever empty: removing the last instance removes the entry.
//! 2. At most one instance per (node, attribute name).
//! 3. Instance ids increase monotonically and are never reused.

use std::fmt;

use attrbind_tree::{NodeId, TreeNode};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::behavior::{Attr, Behavior, CallbackResult};

/// Engine-assigned identity of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// A live behavior bound to one (node, attribute name) pair.
///
/// `value` is written only by the engine.
pub struct Instance<N: TreeNode> {
    id: InstanceId,
    node: NodeId,
    owner: N::Weak,
    name: String,
    value: String,
    behavior: Box<dyn Behavior<N>>,
}

impl<N: TreeNode> fmt::Debug for Instance<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl<N: TreeNode> Instance<N> {
    pub(crate) fn new(
        id: InstanceId,
        owner: &N,
        name: &str,
        value: String,
        behavior: Box<dyn Behavior<N>>,
    ) -> Self {
        Self {
            id,
            node: owner.id(),
            owner: owner.downgrade(),
            name: name.to_owned(),
            value,
            behavior,
        }
    }

    /// Engine-assigned identity.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The owner node, while it is alive.
    #[must_use]
    pub fn owner(&self) -> Option<N> {
        N::upgrade(&self.owner)
    }

    /// Id of the owner node.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current attribute value as last reconciled.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The host behavior.
    #[must_use]
    pub fn behavior(&self) -> &dyn Behavior<N> {
        self.behavior.as_ref()
    }

    /// Downcast the behavior to its concrete type.
    #[must_use]
    pub fn downcast_ref<B: Behavior<N>>(&self) -> Option<&B> {
        self.behavior.as_ref().as_any().downcast_ref::<B>()
    }

    /// Mutable downcast, for host-side state outside callbacks.
    #[must_use]
    pub fn downcast_mut<B: Behavior<N>>(&mut self) -> Option<&mut B> {
        self.behavior.as_mut().as_any_mut().downcast_mut::<B>()
    }

    pub(crate) fn set_value(&mut self, value: String) -> String {
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn connected(&mut self, owner: &N) -> CallbackResult {
        self.behavior
            .connected(Attr::new(owner, &self.name, &self.value))
    }

    pub(crate) fn changed(&mut self, owner: &N, old: &str) -> CallbackResult {
        self.behavior
            .changed(Attr::new(owner, &self.name, &self.value), old, &self.value)
    }

    pub(crate) fn disconnected(&mut self, owner: &N) -> CallbackResult {
        self.behavior
            .disconnected(Attr::new(owner, &self.name, &self.value))
    }
}

struct Entry<N: TreeNode> {
    node: N::Weak,
    instances: IndexMap<String, Instance<N>>,
}

/// Node-keyed instance storage.
pub(crate) struct InstanceStore<N: TreeNode> {
    entries: FxHashMap<NodeId, Entry<N>>,
    next_id: u64,
}

impl<N: TreeNode> Default for InstanceStore<N> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_id: 1,
        }
    }
}

impl<N: TreeNode> InstanceStore<N> {
    pub(crate) fn next_instance_id(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn get(&self, node: &N, name: &str) -> Option<&Instance<N>> {
        self.entries.get(&node.id())?.instances.get(name)
    }

    pub(crate) fn get_mut(&mut self, node: &N, name: &str) -> Option<&mut Instance<N>> {
        self.entries.get_mut(&node.id())?.instances.get_mut(name)
    }

    pub(crate) fn instances_of(&self, node: &N) -> impl Iterator<Item = &Instance<N>> {
        self.entries
            .get(&node.id())
            .into_iter()
            .flat_map(|entry| entry.instances.values())
    }

    /// Insert a new instance, creating the node's entry if needed.
    pub(crate) fn insert(&mut self, node: &N, instance: Instance<N>) -> &mut Instance<N> {
        let entry = self.entries.entry(node.id()).or_insert_with(|| Entry {
            node: node.downgrade(),
            instances: IndexMap::new(),
        });
        debug_assert!(
            !entry.instances.contains_key(&instance.name),
            "duplicate instance for '{}' on node {}",
            instance.name,
            instance.node
        );
        let index = entry.instances.insert_full(instance.name.clone(), instance).0;
        &mut entry.instances[index]
    }

    /// Remove one instance; drops the entry once empty.
    pub(crate) fn remove(&mut self, node: &N, name: &str) -> Option<Instance<N>> {
        let id = node.id();
        let entry = self.entries.get_mut(&id)?;
        let removed = entry.instances.shift_remove(name);
        if entry.instances.is_empty() {
            self.entries.remove(&id);
        }
        removed
    }

    /// Remove a node's oldest instance; drops the entry once empty. The
    /// rest stay stored until they are taken in turn.
    pub(crate) fn take_first(&mut self, node: &N) -> Option<Instance<N>> {
        let id = node.id();
        let entry = self.entries.get_mut(&id)?;
        let taken = entry.instances.shift_remove_index(0).map(|(_, instance)| instance);
        if entry.instances.is_empty() {
            self.entries.remove(&id);
        }
        taken
    }

    /// Drop entries whose node has been reclaimed. Returns how many.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| N::upgrade(&entry.node).is_some());
        before - self.entries.len()
    }

    /// Live stored nodes, in id order.
    pub(crate) fn nodes(&self) -> Vec<N> {
        let mut nodes: Vec<N> = self
            .entries
            .values()
            .filter_map(|entry| N::upgrade(&entry.node))
            .collect();
        nodes.sort_by_key(|node| node.id());
        nodes
    }

    pub(crate) fn node_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.entries.values().map(|e| e.instances.len()).sum()
    }
}
