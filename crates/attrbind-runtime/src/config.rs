#![forbid(unsafe_code)]

//! Registry configuration.

use attrbind_tree::ObserveOptions;

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Options used when the registry subscribes to a notification service.
    pub observe: ObserveOptions,
    /// Tear down instances on every descendant of a removed node. Disable
    /// only for services that report each removed descendant themselves.
    pub downgrade_descendants: bool,
    /// Drop store entries for reclaimed nodes at the start of each batch.
    pub prune_on_apply: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            observe: ObserveOptions::REGISTRY,
            downgrade_descendants: true,
            prune_on_apply: true,
        }
    }
}

impl RegistryConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subscription options.
    #[must_use]
    pub fn with_observe(mut self, observe: ObserveOptions) -> Self {
        self.observe = observe;
        self
    }

    /// Set whether removed subtrees are walked.
    #[must_use]
    pub fn with_downgrade_descendants(mut self, enabled: bool) -> Self {
        self.downgrade_descendants = enabled;
        self
    }

    /// Set whether reclaimed entries are pruned per batch.
    #[must_use]
    pub fn with_prune_on_apply(mut self, enabled: bool) -> Self {
        self.prune_on_apply = enabled;
        self
    }
}
