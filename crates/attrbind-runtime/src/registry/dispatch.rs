#![forbid(unsafe_code)]

//! Change dispatcher: routes records to the reconciler, in batch order.
//!
//! | Record | Routing |
//! |--------|---------|
//! | `Attribute` with a defined name | `reconcile(name, target, old_value)` |
//! | `Attribute` with an undefined name | skipped |
//! | `ChildList` removed nodes | `disconnect` each (subtree included) |
//! | `ChildList` added nodes | `connect` each (own attributes + subtree) |
//!
//! Removals of a record are handled before its additions.
//!
//! Dispatching a removal marks a sweep of stale nodes as pending (see the
//! reconciler docs). The sweep runs at the end of the batch, and again at the
//! start of the next one if a failing callback cut the batch short. It is
//! skipped while descendant teardown is disabled.

use attrbind_tree::{ChangeRecord, TreeNode};
use tracing::trace;

use crate::error::RegistryError;
use crate::registry::reconcile::Reconciler;

impl<N: TreeNode> Reconciler<'_, N> {
    /// Route one record.
    pub(crate) fn dispatch(&mut self, record: ChangeRecord<N>) -> Result<(), RegistryError> {
        self.stats.records += 1;
        match record {
            ChangeRecord::Attribute {
                target,
                name,
                old_value,
            } => {
                if !self.definitions.contains(&name) {
                    self.stats.skipped += 1;
                    trace!(attr = %name, node = %target.id(), "undefined attribute; skipped");
                    return Ok(());
                }
                self.reconcile(&name, &target, old_value.as_deref())
            }
            ChangeRecord::ChildList { added, removed, .. } => {
                if !removed.is_empty() {
                    *self.sweep_pending = true;
                }
                for node in &removed {
                    self.disconnect(node)?;
                }
                for node in &added {
                    self.connect(node)?;
                }
                Ok(())
            }
        }
    }

    /// Run the pending sweep, if any. The flag is cleared only once the
    /// sweep completes.
    pub(crate) fn sweep_if_pending(&mut self) -> Result<(), RegistryError> {
        if !*self.sweep_pending {
            return Ok(());
        }
        if self.downgrade_descendants {
            self.sweep()?;
        }
        *self.sweep_pending = false;
        Ok(())
    }
}
