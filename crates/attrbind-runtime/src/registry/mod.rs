#![forbid(unsafe_code)]

//! Attribute registry: the public facade over definitions, instance store,
//! dispatcher, and reconciler.
//!
//! # Usage
//!
//! ```
//! use attrbind_runtime::{Attr, Behavior, CallbackResult, Registry};
//! use attrbind_tree::{Document, Node};
//!
//! #[derive(Default)]
//! struct Tooltip {
//!     text: String,
//! }
//!
//! impl Behavior<Node> for Tooltip {
//!     fn connected(&mut self, attr: Attr<'_, Node>) -> CallbackResult {
//!         self.text = attr.value().to_owned();
//!         Ok(())
//!     }
//!
//!     fn changed(&mut self, _attr: Attr<'_, Node>, _old: &str, new: &str) -> CallbackResult {
//!         self.text = new.to_owned();
//!         Ok(())
//!     }
//! }
//!
//! let doc = Document::new();
//! let button = doc.create_element("button");
//! doc.root().append_child(&button).unwrap();
//! button.set_attribute("tooltip", "Save").unwrap();
//!
//! let mut registry = Registry::observe(doc.root().clone(), &doc);
//! registry.define("tooltip", Tooltip::default).unwrap();
//! assert_eq!(registry.get(&button, "tooltip").unwrap().value(), "Save");
//!
//! button.set_attribute("tooltip", "Save all").unwrap();
//! registry.deliver().unwrap();
//! let tip = registry.get(&button, "tooltip").unwrap();
//! assert_eq!(tip.downcast_ref::<Tooltip>().unwrap().text, "Save all");
//! ```
//!
//! # Invariants
//!
//! 1. For a defined attribute name A and node N, an instance exists iff N is
//!    connected to the root and carries A (once pending records are applied).
//! 2. At most one instance per (N, A); a torn-down instance is never reused.
//! 3. Redefining A does not rebuild live instances.
//! 4. The registry never keeps a node alive.
//!
//! # Failure Modes
//!
//! - **Missing root**: `RegistryBuilder::build` returns
//!   [`RegistryError::MissingRoot`].
//! - **Failing callback**: the triggering `define`/`apply`/`deliver` returns
//!   [`RegistryError::Callback`]. Records after the failing one are not
//!   applied and are not redelivered. Instances of the failing node that
//!   were not yet torn down stay stored, and the next `apply`/`deliver`
//!   sweeps every stored node that is no longer connected.

mod definitions;
mod dispatch;
mod reconcile;
mod store;

pub use definitions::{Constructor, Definition};
pub use store::{Instance, InstanceId};

use std::fmt;
use std::rc::Rc;

use attrbind_tree::{ChangeRecord, ChangeSource, NotificationService, TreeNode};
use tracing::{debug, debug_span};

use crate::behavior::Behavior;
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use definitions::DefinitionTable;
use reconcile::Reconciler;
use store::InstanceStore;

/// Counters for registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Batches applied.
    pub batches: u64,
    /// Records dispatched.
    pub records: u64,
    /// Instances created.
    pub connected: u64,
    /// Value changes delivered.
    pub changed: u64,
    /// Instances torn down.
    pub disconnected: u64,
    /// Records or matches that produced no work.
    pub skipped: u64,
    /// Store entries dropped because their node was reclaimed.
    pub pruned: u64,
}

/// Attribute-keyed behavior registry over a monitored root.
pub struct Registry<N: TreeNode> {
    root: N,
    config: RegistryConfig,
    definitions: DefinitionTable<N>,
    store: InstanceStore<N>,
    source: Option<Box<dyn ChangeSource<N>>>,
    stats: RegistryStats,
    sweep_pending: bool,
}

impl<N: TreeNode> fmt::Debug for Registry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.root.id())
            .field("definitions", &self.definitions.len())
            .field("tracked_nodes", &self.store.node_count())
            .field("live_instances", &self.store.instance_count())
            .field("subscribed", &self.source.is_some())
            .field("sweep_pending", &self.sweep_pending)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<N: TreeNode> Registry<N> {
    /// Registry over `root` with default configuration and no subscription.
    /// Feed it with [`apply`](Self::apply).
    #[must_use]
    pub fn new(root: N) -> Self {
        Self::from_parts(root, RegistryConfig::default(), None)
    }

    /// Registry over `root`, subscribed once to `service`. Pending records
    /// are applied by [`deliver`](Self::deliver).
    #[must_use]
    pub fn observe<S: NotificationService<N>>(root: N, service: &S) -> Self {
        let config = RegistryConfig::default();
        let source = service.subscribe(&root, config.observe);
        Self::from_parts(root, config, Some(source))
    }

    /// Start a builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder<N> {
        RegistryBuilder::default()
    }

    fn from_parts(
        root: N,
        config: RegistryConfig,
        source: Option<Box<dyn ChangeSource<N>>>,
    ) -> Self {
        debug!(root = %root.id(), subscribed = source.is_some(), "registry created");
        Self {
            root,
            config,
            definitions: DefinitionTable::default(),
            store: InstanceStore::default(),
            source,
            stats: RegistryStats::default(),
            sweep_pending: false,
        }
    }

    fn reconciler(&mut self) -> Reconciler<'_, N> {
        Reconciler {
            root: &self.root,
            definitions: &self.definitions,
            store: &mut self.store,
            stats: &mut self.stats,
            downgrade_descendants: self.config.downgrade_descendants,
            sweep_pending: &mut self.sweep_pending,
        }
    }

    /// The monitored root.
    #[must_use]
    pub fn root(&self) -> &N {
        &self.root
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Register `constructor` for attribute `name` and upgrade every node in
    /// the monitored tree that already carries it.
    ///
    /// Redefining a name replaces the constructor for future instances only.
    pub fn define<B, F>(&mut self, name: impl Into<String>, constructor: F) -> Result<(), RegistryError>
    where
        B: Behavior<N>,
        F: Fn() -> B + 'static,
    {
        let ctor: Constructor<N> =
            Rc::new(move || Box::new(constructor()) as Box<dyn Behavior<N>>);
        self.define_with(Definition::new(name, ctor))
    }

    /// [`define`](Self::define) for behaviors built by `Default`.
    pub fn define_default<B>(&mut self, name: impl Into<String>) -> Result<(), RegistryError>
    where
        B: Behavior<N> + Default,
    {
        self.define(name, B::default)
    }

    /// Register a prepared definition and upgrade matching nodes.
    pub fn define_with(&mut self, definition: Definition<N>) -> Result<(), RegistryError> {
        let name = definition.name().to_owned();
        let _span = debug_span!("registry_define", attr = %name).entered();

        if self.definitions.insert(definition).is_some() {
            debug!(attr = %name, "redefined; live instances keep their behavior");
        } else {
            debug!(attr = %name, "defined");
        }
        self.prune();

        let root = self.root.clone();
        let mut reconciler = self.reconciler();
        if root.is_element() {
            reconciler.reconcile(&name, &root, None)?;
        }
        reconciler.upgrade(&name, &root)
    }

    /// The definition registered for `name`.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&Definition<N>> {
        self.definitions.get(name)
    }

    /// Whether `name` has a definition.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains(name)
    }

    /// Defined attribute names, in first-definition order.
    pub fn defined_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.names()
    }

    /// The live instance for (`node`, `name`). Never creates one.
    #[must_use]
    pub fn get(&self, node: &N, name: &str) -> Option<&Instance<N>> {
        self.store.get(node, name)
    }

    /// Mutable access to a live instance, for host-side state.
    #[must_use]
    pub fn get_mut(&mut self, node: &N, name: &str) -> Option<&mut Instance<N>> {
        self.store.get_mut(node, name)
    }

    /// Live instances on `node`, in creation order.
    pub fn instances(&self, node: &N) -> impl Iterator<Item = &Instance<N>> {
        self.store.instances_of(node)
    }

    /// Total live instances.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.store.instance_count()
    }

    /// Nodes with at least one live instance (or a reclaimed node not yet pruned).
    #[must_use]
    pub fn tracked_nodes(&self) -> usize {
        self.store.node_count()
    }

    /// Drop store entries for reclaimed nodes. Returns how many.
    pub fn prune(&mut self) -> usize {
        let pruned = self.store.prune();
        if pruned > 0 {
            self.stats.pruned += pruned as u64;
            debug!(pruned, "pruned reclaimed nodes");
        }
        pruned
    }

    /// Apply one ordered batch of change records.
    ///
    /// Stops at the first failing callback; earlier records stay applied.
    /// Stale nodes left behind by such a failure are swept before the next
    /// batch's records.
    pub fn apply<I>(&mut self, batch: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = ChangeRecord<N>>,
    {
        let _span = debug_span!("registry_apply", batch = self.stats.batches).entered();
        if self.config.prune_on_apply {
            self.prune();
        }
        self.stats.batches += 1;

        let mut reconciler = self.reconciler();
        reconciler.sweep_if_pending()?;
        for record in batch {
            reconciler.dispatch(record)?;
        }
        reconciler.sweep_if_pending()
    }

    /// Drain the subscribed source and apply what it held. Returns the
    /// number of records in the batch; `0` without a subscription.
    pub fn deliver(&mut self) -> Result<usize, RegistryError> {
        let records = match self.source.as_mut() {
            Some(source) => source.take_records(),
            None => return Ok(0),
        };
        if records.is_empty() && !self.sweep_pending {
            return Ok(0);
        }
        let count = records.len();
        self.apply(records)?;
        Ok(count)
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder<N: TreeNode> {
    root: Option<N>,
    config: RegistryConfig,
    source: Option<Box<dyn ChangeSource<N>>>,
}

impl<N: TreeNode> Default for RegistryBuilder<N> {
    fn default() -> Self {
        Self {
            root: None,
            config: RegistryConfig::default(),
            source: None,
        }
    }
}

impl<N: TreeNode> fmt::Debug for RegistryBuilder<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("root", &self.root.as_ref().map(TreeNode::id))
            .field("config", &self.config)
            .field("source", &self.source.is_some())
            .finish()
    }
}

impl<N: TreeNode> RegistryBuilder<N> {
    /// Set the monitored root.
    #[must_use]
    pub fn root(mut self, root: N) -> Self {
        self.root = Some(root);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing change source.
    #[must_use]
    pub fn source(mut self, source: impl ChangeSource<N> + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Build without subscribing.
    pub fn build(self) -> Result<Registry<N>, RegistryError> {
        let root = self.root.ok_or(RegistryError::MissingRoot)?;
        Ok(Registry::from_parts(root, self.config, self.source))
    }

    /// Build and subscribe the root to `service` with the configured options.
    pub fn subscribe<S: NotificationService<N>>(
        self,
        service: &S,
    ) -> Result<Registry<N>, RegistryError> {
        let root = self.root.ok_or(RegistryError::MissingRoot)?;
        let source = service.subscribe(&root, self.config.observe);
        Ok(Registry::from_parts(root, self.config, Some(source)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
