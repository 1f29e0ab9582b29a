#![forbid(unsafe_code)]

//! Change records and the notification seam.
//!
//! A notification service hands out ordered batches of [`ChangeRecord`]s.
//! Order within a batch is mutation order; consumers must preserve it, since
//! a later record may depend on state produced by an earlier one.

use bitflags::bitflags;

use crate::node::TreeNode;

bitflags! {
    /// What a subscription observes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObserveOptions: u8 {
        /// Attribute additions, changes, and removals.
        const ATTRIBUTES = 0b0001;
        /// Report the previous value in attribute records.
        const ATTRIBUTE_OLD_VALUE = 0b0010;
        /// Child insertions and removals.
        const CHILD_LIST = 0b0100;
        /// Observe the whole subtree, not just the root.
        const SUBTREE = 0b1000;

        /// Everything the registry engine needs.
        const REGISTRY = Self::ATTRIBUTES.bits()
            | Self::ATTRIBUTE_OLD_VALUE.bits()
            | Self::CHILD_LIST.bits()
            | Self::SUBTREE.bits();
    }
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self::REGISTRY
    }
}

/// A single mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord<N> {
    /// An attribute on `target` was set, changed, or removed.
    Attribute {
        target: N,
        name: String,
        /// Value before the mutation; `None` when the attribute was absent
        /// or the subscription did not ask for old values.
        old_value: Option<String>,
    },
    /// Children of `target` were inserted or removed.
    ChildList {
        target: N,
        added: Vec<N>,
        removed: Vec<N>,
    },
}

impl<N> ChangeRecord<N> {
    /// Shorthand for an attribute record.
    pub fn attribute(target: N, name: impl Into<String>, old_value: Option<&str>) -> Self {
        Self::Attribute {
            target,
            name: name.into(),
            old_value: old_value.map(str::to_owned),
        }
    }

    /// Shorthand for a child-list record that only adds.
    pub fn added(target: N, added: Vec<N>) -> Self {
        Self::ChildList {
            target,
            added,
            removed: Vec::new(),
        }
    }

    /// Shorthand for a child-list record that only removes.
    pub fn removed(target: N, removed: Vec<N>) -> Self {
        Self::ChildList {
            target,
            added: Vec::new(),
            removed,
        }
    }

    /// The node the mutation happened on.
    pub fn target(&self) -> &N {
        match self {
            Self::Attribute { target, .. } | Self::ChildList { target, .. } => target,
        }
    }

    /// Whether this is an attribute record.
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute { .. })
    }
}

/// One subscription's queue of pending records.
pub trait ChangeSource<N> {
    /// Drain the pending batch, in mutation order.
    fn take_records(&mut self) -> Vec<ChangeRecord<N>>;
}

/// A tree's native change-notification primitive.
pub trait NotificationService<N: TreeNode> {
    /// Start observing `root` with `options`. Observation continues until the
    /// returned source is dropped.
    fn subscribe(&self, root: &N, options: ObserveOptions) -> Box<dyn ChangeSource<N>>;
}
