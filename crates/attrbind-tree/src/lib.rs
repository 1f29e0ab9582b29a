#![forbid(unsafe_code)]

//! Tree model and change notification for attrbind.
//!
//! # Role in attrbind
//! `attrbind-tree` is the input layer. It defines what the registry engine
//! needs from a document tree ([`TreeNode`]), the change records the engine
//! consumes ([`ChangeRecord`]), and the subscription seam between the two
//! ([`NotificationService`], [`ChangeSource`]).
//!
//! # Primary responsibilities
//! - **TreeNode**: stable node identity, weak handles, attribute reads and
//!   subtree queries.
//! - **ChangeRecord**: attribute and child-list mutation records, delivered
//!   in ordered batches.
//! - **dom**: a single-threaded in-memory document that implements the tree
//!   model, plus a [`MutationObserver`] that queues records for every
//!   mutation under an observed root.
//!
//! # How it fits in the system
//! The runtime (`attrbind-runtime`) is generic over [`TreeNode`] and never
//! touches a concrete tree. Hosts with their own tree implement the traits
//! here; everyone else uses [`dom::Document`].

pub mod dom;
pub mod node;
pub mod observer;
pub mod record;

pub use dom::{Document, Node, TreeError, WeakNode};
pub use node::{NodeId, TreeNode};
pub use observer::MutationObserver;
pub use record::{ChangeRecord, ChangeSource, NotificationService, ObserveOptions};
