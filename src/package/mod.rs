//! Package system
//!
//! Discovers packages from a root package's dependency graph and extra
//! directories, and collects what each one contributes.
//!
//! ## Layout
//!
//! - **registry**: manifests, the dependency walker, discovery
//! - **loader**: contribution modules inside a package
//! - **validation**: structural checks on raw definitions
//! - **handlers**: named callables that modules refer to
//! - **policy**: what happens to errors found along the way

pub mod context;
pub mod handlers;
pub mod loader;
pub mod policy;
pub mod registry;
pub mod traits;
pub mod validation;

pub use context::DiscoveryContext;
pub use handlers::{HandlerRegistry, ModuleFactory};
pub use policy::{CollectingSink, ErrorPolicy, ErrorSink, TracingSink};
pub use registry::{
    DependencyWalker, DiscoveredPackages, DiscoveryOptions, PackageDiscovery, PackageManifest,
    PackageNode,
};
pub use traits::{DiscoveryError, ErrorClass};
