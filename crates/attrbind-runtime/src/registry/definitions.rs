#![forbid(unsafe_code)]

//! Attribute definition table.
//!
//! Maps attribute names to behavior constructors. Entries are never removed;
//! redefining a name replaces its constructor but keeps its position, so
//! iteration order is first-definition order.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::behavior::Behavior;

/// Zero-argument behavior constructor.
pub type Constructor<N> = Rc<dyn Fn() -> Box<dyn Behavior<N>>>;

/// A registered (attribute name, constructor) pair.
pub struct Definition<N> {
    name: String,
    constructor: Constructor<N>,
}

impl<N> Clone for Definition<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            constructor: Rc::clone(&self.constructor),
        }
    }
}

impl<N> fmt::Debug for Definition<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<N> Definition<N> {
    /// Wrap a constructor.
    pub fn new(name: impl Into<String>, constructor: Constructor<N>) -> Self {
        Self {
            name: name.into(),
            constructor,
        }
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh behavior.
    #[must_use]
    pub fn construct(&self) -> Box<dyn Behavior<N>> {
        (self.constructor)()
    }

    /// Whether both definitions share the same constructor.
    #[must_use]
    pub fn same_constructor(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.constructor, &other.constructor)
    }
}

/// Ordered attribute name → definition table.
pub(crate) struct DefinitionTable<N> {
    entries: IndexMap<String, Definition<N>>,
}

impl<N> Default for DefinitionTable<N> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<N> DefinitionTable<N> {
    /// Store or overwrite. Returns the replaced definition, if any.
    pub(crate) fn insert(&mut self, definition: Definition<N>) -> Option<Definition<N>> {
        self.entries.insert(definition.name.clone(), definition)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Definition<N>> {
        self.entries.get(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
