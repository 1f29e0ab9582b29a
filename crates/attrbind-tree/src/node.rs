#![forbid(unsafe_code)]

//! The tree model consumed by the registry engine.

use std::fmt;

/// Stable identity of a node.
///
/// Ids are assigned once and never reused for the lifetime of a process, so
/// a stale id left behind by a reclaimed node can never alias a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to a node in a hierarchical, attribute-carrying tree.
///
/// Handles are cheap to clone and compare by identity. The registry keeps
/// only [`TreeNode::Weak`] handles in its long-lived state.
///
/// # Contract
///
/// - [`id`](TreeNode::id) is stable and unique for the node's lifetime.
/// - [`contains`](TreeNode::contains) is inclusive: `n.contains(&n)` holds.
/// - [`query_attribute`](TreeNode::query_attribute) returns descendants in
///   document order and never the node itself.
pub trait TreeNode: Clone + 'static {
    /// Non-owning handle to a node.
    type Weak: Clone + 'static;

    /// Stable identity.
    fn id(&self) -> NodeId;

    /// Create a non-owning handle.
    fn downgrade(&self) -> Self::Weak;

    /// Recover a strong handle, if the node is still alive.
    fn upgrade(weak: &Self::Weak) -> Option<Self>;

    /// Whether the node can carry attributes. Text-like nodes return `false`.
    fn is_element(&self) -> bool;

    /// Current value of attribute `name`, or `None` when absent.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Names of all attributes currently on the node, in insertion order.
    fn attribute_names(&self) -> Vec<String>;

    /// Whether `other` is this node or one of its descendants.
    fn contains(&self, other: &Self) -> bool;

    /// Every descendant carrying attribute `name`, in document order.
    fn query_attribute(&self, name: &str) -> Vec<Self>;

    /// Every descendant, in document order.
    fn descendants(&self) -> Vec<Self>;
}
