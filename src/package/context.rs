//! Discovery context
//!
//! Everything one service instance's discovery shares: the handler
//! registry, the module cache, the error policy, and the walker settings.
//! Owned by the composition root and passed down explicitly.

use std::sync::Arc;

use crate::package::handlers::HandlerRegistry;
use crate::package::loader::ModuleCache;
use crate::package::policy::ErrorPolicy;
use crate::package::registry::walker::DependencyWalker;

#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub registry: Arc<HandlerRegistry>,
    pub cache: Arc<ModuleCache>,
    pub policy: ErrorPolicy,
    pub walker: DependencyWalker,
}

impl DiscoveryContext {
    pub fn new(registry: HandlerRegistry, policy: ErrorPolicy) -> Self {
        Self {
            registry: Arc::new(registry),
            cache: Arc::new(ModuleCache::new()),
            policy,
            walker: DependencyWalker::default(),
        }
    }

    pub fn with_walker(mut self, walker: DependencyWalker) -> Self {
        self.walker = walker;
        self
    }
}

impl Default for DiscoveryContext {
    fn default() -> Self {
        Self::new(HandlerRegistry::new(), ErrorPolicy::default())
    }
}
