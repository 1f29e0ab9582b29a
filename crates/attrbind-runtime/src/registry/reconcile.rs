#![forbid(unsafe_code)]

//! The reconciler: keeps the instance store in step with the tree.
//!
//! # Algorithm
//!
//! ```text
//! reconcile(name, node, old)
//!   current = node.attribute(name)          (never the record's payload)
//!   ├─ no instance, current = Some(v) ─► construct, bind, insert, connected()
//!   ├─ no instance, current = None    ─► nothing
//!   ├─ instance,    current = None    ─► remove, disconnected()
//!   ├─ instance,    node detached     ─► remove, disconnected()
//!   ├─ instance,    current ≠ value   ─► value = current, changed(old, current)
//!   └─ instance,    current = value   ─► nothing (idempotent re-delivery)
//! ```
//!
//! Every branch commits the store change before invoking the callback, so a
//! failing callback leaves the store matching the tree.
//!
//! An instance whose node is no longer connected is torn down rather than
//! sent `changed`.
//!
//! Upgrade walks a subtree for one attribute name. Connect reconciles a node's
//! own attributes and then upgrades its subtree for every definition.
//! Disconnect tears down every instance of a node (and, by default, of its
//! descendants) regardless of attribute state.
//!
//! The descendant walk sees the tree as it is when the batch runs, not as it
//! was at removal time. A node moved out of a removed subtree while detached
//! is missed by the walk, so a batch with removals ends with a sweep that
//! tears down every stored node no longer connected to the root. The
//! pending flag lives on the registry: a sweep cut short by a failing
//! callback runs again at the start of the next batch.

use attrbind_tree::TreeNode;
use tracing::{debug, trace};

use crate::error::{CallbackError, Lifecycle, RegistryError};
use crate::registry::RegistryStats;
use crate::registry::definitions::DefinitionTable;
use crate::registry::store::{Instance, InstanceStore};

/// Borrowed view over the registry state for one operation.
pub(crate) struct Reconciler<'a, N: TreeNode> {
    pub(crate) root: &'a N,
    pub(crate) definitions: &'a DefinitionTable<N>,
    pub(crate) store: &'a mut InstanceStore<N>,
    pub(crate) stats: &'a mut RegistryStats,
    pub(crate) downgrade_descendants: bool,
    /// Set when a removal is dispatched; cleared only by a completed sweep.
    /// Owned by the registry so an aborted batch leaves it set.
    pub(crate) sweep_pending: &'a mut bool,
}

fn callback_error<N: TreeNode>(
    phase: Lifecycle,
    instance: &Instance<N>,
    source: crate::error::BoxError,
) -> RegistryError {
    RegistryError::Callback(CallbackError {
        phase,
        name: instance.name().to_owned(),
        node: instance.node_id(),
        source,
    })
}

impl<N: TreeNode> Reconciler<'_, N> {
    /// Whether `node` is reachable from the monitored root.
    pub(crate) fn is_connected(&self, node: &N) -> bool {
        self.root.contains(node)
    }

    /// Bring the (node, name) binding in line with the node's current state.
    ///
    /// `old` is the previous value reported by the notification service, or
    /// `None` for synthetic upgrades.
    pub(crate) fn reconcile(
        &mut self,
        name: &str,
        node: &N,
        old: Option<&str>,
    ) -> Result<(), RegistryError> {
        let current = node.attribute(name);
        let known = self.store.get(node, name).map(|i| i.value().to_owned());

        match (known, current) {
            (None, None) => Ok(()),
            (None, Some(value)) => self.instantiate(name, node, value),
            (Some(_), None) => self.teardown(name, node),
            (Some(_), Some(_)) if !self.is_connected(node) => self.teardown(name, node),
            (Some(known), Some(value)) if known != value => {
                let Some(instance) = self.store.get_mut(node, name) else {
                    return Ok(());
                };
                let previous = instance.set_value(value);
                // A reported value equal to the new one is stale; fall back.
                let old = match old {
                    Some(reported) if reported != instance.value() => reported.to_owned(),
                    _ => previous,
                };
                self.stats.changed += 1;
                trace!(attr = name, node = %node.id(), old = %old, new = instance.value(), "attribute changed");
                instance
                    .changed(node, &old)
                    .map_err(|e| callback_error(Lifecycle::Changed, instance, e))
            }
            (Some(_), Some(_)) => Ok(()),
        }
    }

    fn teardown(&mut self, name: &str, node: &N) -> Result<(), RegistryError> {
        let Some(mut instance) = self.store.remove(node, name) else {
            return Ok(());
        };
        self.stats.disconnected += 1;
        debug!(attr = name, node = %node.id(), instance = instance.id().0, "attribute removed");
        instance
            .disconnected(node)
            .map_err(|e| callback_error(Lifecycle::Disconnected, &instance, e))
    }

    fn instantiate(&mut self, name: &str, node: &N, value: String) -> Result<(), RegistryError> {
        let definitions = self.definitions;
        let Some(definition) = definitions.get(name) else {
            return Ok(());
        };
        if !node.is_element() || !self.is_connected(node) {
            self.stats.skipped += 1;
            trace!(attr = name, node = %node.id(), "not connected; no instance");
            return Ok(());
        }

        let id = self.store.next_instance_id();
        let behavior = definition.construct();
        let instance = self
            .store
            .insert(node, Instance::new(id, node, name, value, behavior));
        self.stats.connected += 1;
        debug!(attr = name, node = %node.id(), instance = id.0, "instance connected");
        instance
            .connected(node)
            .map_err(|e| callback_error(Lifecycle::Connected, instance, e))
    }

    /// Reconcile every descendant of `subtree` carrying `name`.
    pub(crate) fn upgrade(&mut self, name: &str, subtree: &N) -> Result<(), RegistryError> {
        for node in subtree.query_attribute(name) {
            self.reconcile(name, &node, None)?;
        }
        Ok(())
    }

    /// A node entered the tree.
    pub(crate) fn connect(&mut self, node: &N) -> Result<(), RegistryError> {
        if !node.is_element() || !self.is_connected(node) {
            return Ok(());
        }
        let definitions = self.definitions;

        for name in node.attribute_names() {
            if definitions.contains(&name) {
                self.reconcile(&name, node, None)?;
            }
        }
        for name in definitions.names() {
            self.upgrade(name, node)?;
        }
        self.refresh(node)
    }

    /// Re-check instances already stored inside an added subtree. Attributes
    /// removed while the subtree was detached were never reported, and the
    /// upgrade scans only visit nodes that still carry the attribute.
    fn refresh(&mut self, subtree: &N) -> Result<(), RegistryError> {
        if self.store.node_count() == 0 {
            return Ok(());
        }
        let mut nodes = vec![subtree.clone()];
        nodes.extend(subtree.descendants());
        for node in nodes {
            let names: Vec<String> = self
                .store
                .instances_of(&node)
                .map(|instance| instance.name().to_owned())
                .collect();
            for name in names {
                self.reconcile(&name, &node, None)?;
            }
        }
        Ok(())
    }

    /// A node left the tree.
    pub(crate) fn disconnect(&mut self, node: &N) -> Result<(), RegistryError> {
        self.downgrade(node)?;
        if self.downgrade_descendants {
            for descendant in node.descendants() {
                self.downgrade(&descendant)?;
            }
        }
        Ok(())
    }

    /// Tear down instances on stored nodes that are no longer connected.
    pub(crate) fn sweep(&mut self) -> Result<(), RegistryError> {
        for node in self.store.nodes() {
            if !self.is_connected(&node) {
                trace!(node = %node.id(), "stale node swept");
                self.downgrade(&node)?;
            }
        }
        Ok(())
    }

    /// Tear down every instance of `node`, oldest first. Instances are taken
    /// one at a time, so those after a failing callback stay stored.
    fn downgrade(&mut self, node: &N) -> Result<(), RegistryError> {
        while let Some(mut instance) = self.store.take_first(node) {
            self.stats.disconnected += 1;
            debug!(attr = instance.name(), node = %node.id(), instance = instance.id().0, "node removed");
            instance
                .disconnected(node)
                .map_err(|e| callback_error(Lifecycle::Disconnected, &instance, e))?;
        }
        Ok(())
    }
}
