//! Package registry and discovery
//!
//! Handles manifest parsing, dependency graph walking, and package discovery.

pub mod discovery;
pub mod manifest;
pub mod walker;

pub use discovery::{
    ConfigEntry, DiscoveredPackages, DiscoveryOptions, PackageContributions, PackageDiscovery,
};
pub use manifest::{PackageManifest, PackageNode, DEFAULT_MANIFEST_FILE};
pub use walker::{DependencyWalker, VisitSignal, WalkReport, DEFAULT_INSTALL_DIR};
