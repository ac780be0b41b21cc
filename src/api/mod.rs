//! Route composition
//!
//! Route model and namespacing, per-package tables, the registrar that binds
//! them onto a router, config callbacks, and the standard routes.

pub mod builtin;
pub mod config_runner;
pub mod registrar;
pub mod route;
pub mod table;

pub use builtin::{package_versions, StandardRoutes, SERVICES_PACKAGE};
pub use config_runner::{config_fn, run_configs, ConfigContext, ConfigEnv, ConfigFn, ConfigOutcome};
pub use registrar::{register, RegistrationReport, SUPPORTED_METHODS};
pub use route::{mount_path, namespace_path, normalize, RouteDefinition, RouteSummary};
pub use table::{ConnectTable, ManifestSet, PackageTable, RouteTable, SocketTable};
