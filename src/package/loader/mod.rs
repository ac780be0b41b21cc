//! Contribution module loading
//!
//! Finds a package's module files and resolves their exports.

pub mod loader;

pub use loader::{ContributionSource, ModuleCache, ModuleExports, ModuleLoader, DEFAULT_PATTERNS};
