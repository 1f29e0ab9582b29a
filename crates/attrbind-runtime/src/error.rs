#![forbid(unsafe_code)]

//! Registry errors.
//!
//! | Error | Raised by | Recoverable |
//! |-------|-----------|-------------|
//! | `MissingRoot` | `RegistryBuilder::build` | no registry is produced |
//! | `Callback` | `define`, `apply`, `deliver` | state already committed stays committed |

use std::fmt;

use attrbind_tree::NodeId;

/// Error type host callbacks return.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Which lifecycle callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Connected,
    Changed,
    Disconnected,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Changed => "changed",
            Self::Disconnected => "disconnected",
        })
    }
}

/// A behavior's lifecycle callback returned an error.
#[derive(Debug)]
pub struct CallbackError {
    pub phase: Lifecycle,
    pub name: String,
    pub node: NodeId,
    pub source: BoxError,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} callback for '{}' on node {} failed: {}",
            self.phase, self.name, self.node, self.source
        )
    }
}

impl std::error::Error for CallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Errors from registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// The registry was built without a monitored root.
    MissingRoot,
    /// A lifecycle callback failed; the triggering operation was aborted.
    Callback(CallbackError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRoot => f.write_str("registry requires a monitored root"),
            Self::Callback(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingRoot => None,
            Self::Callback(err) => Some(err),
        }
    }
}

impl From<CallbackError> for RegistryError {
    fn from(err: CallbackError) -> Self {
        Self::Callback(err)
    }
}
