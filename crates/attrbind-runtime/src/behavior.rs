#![forbid(unsafe_code)]

//! Host-supplied behaviors.
//!
//! A behavior is any `'static` type implementing [`Behavior`]. All three
//! lifecycle methods are optional: the defaults do nothing, so a behavior
//! overrides only the transitions it cares about.
//!
//! Before any callback runs, the engine has already bound the instance to its
//! owner node, attribute name, and current value; callbacks observe that
//! binding through [`Attr`].

use std::any::Any;

use crate::error::BoxError;

/// Result of a lifecycle callback.
pub type CallbackResult = Result<(), BoxError>;

/// The binding a callback runs against.
#[derive(Debug)]
pub struct Attr<'a, N> {
    owner: &'a N,
    name: &'a str,
    value: &'a str,
}

impl<'a, N> Attr<'a, N> {
    pub(crate) fn new(owner: &'a N, name: &'a str, value: &'a str) -> Self {
        Self { owner, name, value }
    }

    /// The node carrying the attribute.
    #[must_use]
    pub fn owner(&self) -> &'a N {
        self.owner
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Current value, as last observed by the engine.
    #[must_use]
    pub fn value(&self) -> &'a str {
        self.value
    }
}

/// Type-erasure helper so instances can be downcast to the host's type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Lifecycle of one (node, attribute) binding.
///
/// ```text
/// connected ──► changed* ──► disconnected
/// ```
///
/// An error returned from a callback aborts the operation that triggered it
/// (a `define` or a batch). The engine does not retry.
pub trait Behavior<N>: AsAny {
    /// The attribute appeared on a connected node, the node was connected,
    /// or the attribute name was defined while already present.
    fn connected(&mut self, attr: Attr<'_, N>) -> CallbackResult {
        let _ = attr;
        Ok(())
    }

    /// The attribute or its node left the monitored tree.
    fn disconnected(&mut self, attr: Attr<'_, N>) -> CallbackResult {
        let _ = attr;
        Ok(())
    }

    /// The value changed from `old` to `new`. `attr.value()` already reads `new`.
    fn changed(&mut self, attr: Attr<'_, N>, old: &str, new: &str) -> CallbackResult {
        let _ = (attr, old, new);
        Ok(())
    }
}
