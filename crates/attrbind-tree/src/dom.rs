#![forbid(unsafe_code)]

//! Single-threaded in-memory document.
//!
//! # Design
//!
//! Nodes are `Rc`-shared. A parent owns its children strongly; a child points
//! back at its parent weakly, so dropping the last handle to a detached
//! subtree reclaims it. Every mutation is reported to the document's live
//! [`MutationObserver`]s in mutation order.
//!
//! ```text
//! Document ──► #document ──► <div> ──► <span data-foo="1">
//!    │                          ▲             │
//!    │                          └── parent ───┘ (weak)
//!    └── observers: Vec<Weak<ObserverInner>> (pruned lazily)
//! ```
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Inserting a node into its own subtree | `TreeError::HierarchyRequest` |
//! | Children under a text node | `TreeError::HierarchyRequest` |
//! | Reference/removed node is not a child | `TreeError::NotFound` |
//! | Attributes on a non-element | `TreeError::NotAnElement` |
//! | Empty or whitespace attribute name | `TreeError::InvalidAttributeName` |
//! | Node from another document | `TreeError::WrongDocument` |

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::node::{NodeId, TreeNode};
use crate::observer::{MutationObserver, ObserverInner};
use crate::record::{ChangeRecord, ChangeSource, NotificationService, ObserveOptions};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> NodeId {
    NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Errors from tree mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The insertion would create a cycle or put children under a leaf.
    HierarchyRequest { parent: NodeId, child: NodeId },
    /// The node is not a child of `parent`.
    NotFound { parent: NodeId, child: NodeId },
    /// The node cannot carry attributes.
    NotAnElement(NodeId),
    /// Attribute names must be non-empty and free of whitespace.
    InvalidAttributeName(String),
    /// The node belongs to a different document.
    WrongDocument(NodeId),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HierarchyRequest { parent, child } => {
                write!(f, "cannot insert node {child} under {parent}")
            }
            Self::NotFound { parent, child } => {
                write!(f, "node {child} is not a child of {parent}")
            }
            Self::NotAnElement(id) => write!(f, "node {id} cannot carry attributes"),
            Self::InvalidAttributeName(name) => write!(f, "invalid attribute name: {name:?}"),
            Self::WrongDocument(id) => write!(f, "node {id} belongs to another document"),
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Debug)]
enum NodeKind {
    Document,
    Element { tag: String },
    Text { data: String },
}

pub(crate) struct DocumentInner {
    observers: RefCell<Vec<Weak<ObserverInner>>>,
}

impl DocumentInner {
    fn register(&self, observer: &Rc<ObserverInner>) {
        self.observers.borrow_mut().push(Rc::downgrade(observer));
    }

    /// Queue a record on every live observer whose scope covers `target`.
    fn queue(&self, target: &Node, record: impl Fn(ObserveOptions) -> Option<ChangeRecord<Node>>) {
        let observers: Vec<Rc<ObserverInner>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|w| w.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        for observer in observers {
            if !observer.covers(target) {
                continue;
            }
            if let Some(rec) = record(observer.options()) {
                #[cfg(feature = "tracing")]
                {
                    let kind = if rec.is_attribute() { "attributes" } else { "childList" };
                    tracing::trace!(node = %target.id(), kind, "queue mutation record");
                }
                observer.push(rec);
            }
        }
    }
}

/// An in-memory document: a `#document` root plus its observers.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
    root: Node,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root.id())
            .field("observers", &self.inner.observers.borrow().len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        let inner = Rc::new(DocumentInner {
            observers: RefCell::new(Vec::new()),
        });
        let root = Node::create(&inner, NodeKind::Document);
        Self { inner, root }
    }

    /// The `#document` node. It carries no attributes.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Create a detached element.
    #[must_use]
    pub fn create_element(&self, tag: impl Into<String>) -> Node {
        Node::create(&self.inner, NodeKind::Element { tag: tag.into() })
    }

    /// Create a detached text node.
    #[must_use]
    pub fn create_text(&self, data: impl Into<String>) -> Node {
        Node::create(&self.inner, NodeKind::Text { data: data.into() })
    }

    /// Observe `target` with `options`.
    ///
    /// Records are queued until [`MutationObserver::take_records`] drains
    /// them. Dropping every handle to the observer stops observation.
    pub fn observe(&self, target: &Node, options: ObserveOptions) -> MutationObserver {
        let observer = MutationObserver::new(target.clone(), options);
        self.inner.register(observer.inner());
        observer
    }

    /// Number of registered observers, including dead ones not yet pruned.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }
}

impl NotificationService<Node> for Document {
    fn subscribe(&self, root: &Node, options: ObserveOptions) -> Box<dyn ChangeSource<Node>> {
        Box::new(self.observe(root, options))
    }
}

struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    doc: Weak<DocumentInner>,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<Node>>,
    attributes: RefCell<IndexMap<String, String>>,
}

/// A shared handle to a node. Clones refer to the same node.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

/// A non-owning handle to a [`Node`].
#[derive(Clone)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    /// Recover a strong handle, if the node is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({:?})", node),
            None => f.write_str("WeakNode(<reclaimed>)"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Document => write!(f, "#document{}", self.0.id),
            NodeKind::Element { tag } => {
                write!(f, "<{tag}")?;
                for (name, value) in self.0.attributes.borrow().iter() {
                    write!(f, " {name}={value:?}")?;
                }
                write!(f, ">{}", self.0.id)
            }
            NodeKind::Text { data } => write!(f, "{data:?}{}", self.0.id),
        }
    }
}

impl Node {
    fn create(doc: &Rc<DocumentInner>, kind: NodeKind) -> Self {
        Self(Rc::new(NodeInner {
            id: next_id(),
            kind,
            doc: Rc::downgrade(doc),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(IndexMap::new()),
        }))
    }

    /// Stable identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    /// Tag name for elements.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    /// Character data for text nodes.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Text { data } => Some(data),
            _ => None,
        }
    }

    /// Whether the node can carry attributes.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element { .. })
    }

    /// Parent node, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the child list.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    /// Whether `other` is this node or one of its descendants.
    #[must_use]
    pub fn contains(&self, other: &Node) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(node) = cursor {
            if node == *self {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Every descendant in document order (pre-order, excluding `self`).
    #[must_use]
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Node> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Every descendant carrying attribute `name`, in document order.
    #[must_use]
    pub fn query_attribute(&self, name: &str) -> Vec<Node> {
        self.descendants()
            .into_iter()
            .filter(|n| n.has_attribute(name))
            .collect()
    }

    /// Current value of attribute `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    /// Whether attribute `name` is present.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.borrow().contains_key(name)
    }

    /// Attribute names in insertion order.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.0.attributes.borrow().keys().cloned().collect()
    }

    /// Set attribute `name` to `value`. Re-setting the same value still
    /// produces a record, as the native primitive does.
    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TreeError> {
        let name = name.into();
        if !self.is_element() {
            return Err(TreeError::NotAnElement(self.id()));
        }
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(TreeError::InvalidAttributeName(name));
        }
        let old = self
            .0
            .attributes
            .borrow_mut()
            .insert(name.clone(), value.into());
        self.queue_attribute(&name, old);
        Ok(())
    }

    /// Remove attribute `name`, returning its old value. Removing an absent
    /// attribute records nothing.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        let old = self.0.attributes.borrow_mut().shift_remove(name)?;
        self.queue_attribute(name, Some(old.clone()));
        Some(old)
    }

    /// Append `child` as the last child, moving it if already attached.
    pub fn append_child(&self, child: &Node) -> Result<(), TreeError> {
        self.insert_before(child, None)
    }

    /// Insert `child` before `reference` (or last when `None`), moving it if
    /// already attached.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), TreeError> {
        if !Weak::ptr_eq(&self.0.doc, &child.0.doc) {
            return Err(TreeError::WrongDocument(child.id()));
        }
        if matches!(self.0.kind, NodeKind::Text { .. })
            || matches!(child.0.kind, NodeKind::Document)
            || child.contains(self)
        {
            return Err(TreeError::HierarchyRequest {
                parent: self.id(),
                child: child.id(),
            });
        }
        if let Some(reference) = reference {
            if reference.parent().as_ref() != Some(self) {
                return Err(TreeError::NotFound {
                    parent: self.id(),
                    child: reference.id(),
                });
            }
        }

        // Inserting before itself means "before its next sibling".
        let reference = match reference {
            Some(r) if r == child => child.next_sibling(),
            other => other.cloned(),
        };

        if let Some(old_parent) = child.parent() {
            old_parent.detach(child);
        }

        {
            let mut children = self.0.children.borrow_mut();
            let index = reference
                .as_ref()
                .and_then(|r| children.iter().position(|c| c == r))
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);

        self.queue_child_list(vec![child.clone()], Vec::new());
        Ok(())
    }

    /// Remove `child`, returning it.
    pub fn remove_child(&self, child: &Node) -> Result<Node, TreeError> {
        if child.parent().as_ref() != Some(self) {
            return Err(TreeError::NotFound {
                parent: self.id(),
                child: child.id(),
            });
        }
        self.detach(child);
        Ok(child.clone())
    }

    /// Detach this node from its parent, if any.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.detach(self);
        }
    }

    fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.0.children.borrow();
        let index = children.iter().position(|c| c == self)?;
        children.get(index + 1).cloned()
    }

    fn detach(&self, child: &Node) {
        self.0.children.borrow_mut().retain(|c| c != child);
        *child.0.parent.borrow_mut() = Weak::new();
        self.queue_child_list(Vec::new(), vec![child.clone()]);
    }

    fn queue_attribute(&self, name: &str, old: Option<String>) {
        let Some(doc) = self.0.doc.upgrade() else {
            return;
        };
        doc.queue(self, |options| {
            options
                .contains(ObserveOptions::ATTRIBUTES)
                .then(|| ChangeRecord::Attribute {
                    target: self.clone(),
                    name: name.to_owned(),
                    old_value: if options.contains(ObserveOptions::ATTRIBUTE_OLD_VALUE) {
                        old.clone()
                    } else {
                        None
                    },
                })
        });
    }

    fn queue_child_list(&self, added: Vec<Node>, removed: Vec<Node>) {
        let Some(doc) = self.0.doc.upgrade() else {
            return;
        };
        doc.queue(self, |options| {
            options
                .contains(ObserveOptions::CHILD_LIST)
                .then(|| ChangeRecord::ChildList {
                    target: self.clone(),
                    added: added.clone(),
                    removed: removed.clone(),
                })
        });
    }
}

impl TreeNode for Node {
    type Weak = WeakNode;

    fn id(&self) -> NodeId {
        Node::id(self)
    }

    fn downgrade(&self) -> WeakNode {
        Node::downgrade(self)
    }

    fn upgrade(weak: &WeakNode) -> Option<Self> {
        weak.upgrade()
    }

    fn is_element(&self) -> bool {
        Node::is_element(self)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        Node::attribute(self, name)
    }

    fn attribute_names(&self) -> Vec<String> {
        Node::attribute_names(self)
    }

    fn contains(&self, other: &Self) -> bool {
        Node::contains(self, other)
    }

    fn query_attribute(&self, name: &str) -> Vec<Self> {
        Node::query_attribute(self, name)
    }

    fn descendants(&self) -> Vec<Self> {
        Node::descendants(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
