#![forbid(unsafe_code)]

//! Mutation observer for the in-memory document.
//!
//! The document keeps observers as `Weak` references and prunes dead ones
//! lazily, the next time a mutation is queued. Dropping every
//! [`MutationObserver`] handle therefore ends observation without any
//! explicit unregistration.
//!
//! # Invariants
//!
//! 1. Records are queued in mutation order.
//! 2. Scope is decided at mutation time: a mutation is recorded when the
//!    observed root is the target, or (with `SUBTREE`) an ancestor of it.
//! 3. After [`disconnect`](MutationObserver::disconnect) nothing is queued,
//!    and pending records are discarded.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dom::Node;
use crate::record::{ChangeRecord, ChangeSource, ObserveOptions};

pub(crate) struct ObserverInner {
    root: Node,
    options: ObserveOptions,
    active: Cell<bool>,
    queue: RefCell<Vec<ChangeRecord<Node>>>,
}

impl ObserverInner {
    pub(crate) fn options(&self) -> ObserveOptions {
        self.options
    }

    pub(crate) fn covers(&self, target: &Node) -> bool {
        if !self.active.get() {
            return false;
        }
        if *target == self.root {
            return true;
        }
        self.options.contains(ObserveOptions::SUBTREE) && self.root.contains(target)
    }

    pub(crate) fn push(&self, record: ChangeRecord<Node>) {
        self.queue.borrow_mut().push(record);
    }
}

/// Handle to a subscription on a [`Document`](crate::Document).
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct MutationObserver {
    inner: Rc<ObserverInner>,
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationObserver")
            .field("root", &self.inner.root.id())
            .field("options", &self.inner.options)
            .field("active", &self.inner.active.get())
            .field("pending", &self.inner.queue.borrow().len())
            .finish()
    }
}

impl MutationObserver {
    pub(crate) fn new(root: Node, options: ObserveOptions) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                root,
                options,
                active: Cell::new(true),
                queue: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<ObserverInner> {
        &self.inner
    }

    /// The observed root.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.inner.root
    }

    /// Drain the pending batch.
    pub fn take_records(&self) -> Vec<ChangeRecord<Node>> {
        std::mem::take(&mut *self.inner.queue.borrow_mut())
    }

    /// Number of records waiting to be taken.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether the observer still records mutations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Stop observing and discard pending records.
    pub fn disconnect(&self) {
        self.inner.active.set(false);
        self.inner.queue.borrow_mut().clear();
    }
}

impl ChangeSource<Node> for MutationObserver {
    fn take_records(&mut self) -> Vec<ChangeRecord<Node>> {
        MutationObserver::take_records(self)
    }
}
