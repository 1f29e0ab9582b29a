#![forbid(unsafe_code)]

//! attrbind public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users: the
//! registry from `attrbind-runtime` and the tree model plus in-memory
//! document from `attrbind-tree`.

pub use attrbind_runtime::{
    Attr, Behavior, CallbackError, CallbackResult, Instance, InstanceId, Lifecycle, Registry,
    RegistryBuilder, RegistryConfig, RegistryError, RegistryStats,
};
pub use attrbind_tree::{
    ChangeRecord, ChangeSource, Document, MutationObserver, Node, NodeId, NotificationService,
    ObserveOptions, TreeError, TreeNode,
};

pub mod prelude {
    pub use attrbind_runtime as runtime;
    pub use attrbind_tree as tree;

    pub use attrbind_runtime::{Attr, Behavior, CallbackResult, Registry, RegistryConfig};
    pub use attrbind_tree::{Document, Node, ObserveOptions};
}
