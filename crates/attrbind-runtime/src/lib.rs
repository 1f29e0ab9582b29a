#![forbid(unsafe_code)]

//! Runtime: the attribute-keyed behavior registry.
//!
//! # Role in attrbind
//! `attrbind-runtime` is the engine. Hosts register a behavior constructor
//! per attribute name; the registry keeps exactly one live instance for each
//! (node, defined attribute) pair in the monitored subtree and drives its
//! lifecycle callbacks as the tree changes.
//!
//! # Primary responsibilities
//! - **Registry**: definitions, instance lookup, batch application.
//! - **Behavior**: the host-side lifecycle trait (`connected`, `changed`,
//!   `disconnected`).
//! - **RegistryConfig**: subscription options and teardown policy.
//! - **Errors**: callback failures carry the phase, attribute, and node.
//!
//! # How it fits in the system
//! The registry is generic over [`attrbind_tree::TreeNode`]. It consumes
//! ordered batches of [`attrbind_tree::ChangeRecord`], either handed to
//! [`Registry::apply`] or pulled from a subscription by [`Registry::deliver`].
//! It never mutates the tree.
//!
//! # Logging
//! Registry activity is logged with `tracing` at `debug` (instance lifecycle,
//! definitions) and `trace` (skipped records, value changes).

pub mod behavior;
pub mod config;
pub mod error;
pub mod registry;

pub use behavior::{AsAny, Attr, Behavior, CallbackResult};
pub use config::RegistryConfig;
pub use error::{BoxError, CallbackError, Lifecycle, RegistryError};
pub use registry::{
    Constructor, Definition, Instance, InstanceId, Registry, RegistryBuilder, RegistryStats,
};
