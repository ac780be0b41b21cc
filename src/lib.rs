//! Package Services - composes package contributions into one service
//!
//! Packages are directories with a manifest naming them and their
//! dependencies on other packages. Starting from a root package, this crate
//! walks the dependency graph, loads each package's contribution modules,
//! and merges what they declare into a single HTTP route map and a set of
//! realtime event bindings, without the packages knowing about each other.
//!
//! ## Pipeline
//!
//! 1. **Discovery** (`package`): walk the graph (blocking or non-blocking),
//!    validate and namespace route and socket definitions
//! 2. **Configuration** (`api::config_runner`): run package config callbacks
//! 3. **Registration** (`api::registrar`): bind routes behind an
//!    authorization gate, reporting duplicates across packages
//! 4. **Realtime** (`realtime`): bind socket definitions onto per-package
//!    namespaces and outbound peer connections
//!
//! ## Design Principles
//!
//! 1. **Explicit context**: no process-wide registries; a
//!    [`DiscoveryContext`] is passed through every stage
//! 2. **Explicit error policy**: fail fast, or report and skip
//! 3. **Frozen at start**: routes and role tables do not change while serving

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod package;
pub mod realtime;
pub mod service;
pub mod utils;

// Re-export config module
pub use config::*;

pub use api::{RouteDefinition, RouteTable};
pub use auth::{AccessControl, Identity};
pub use package::{
    DiscoveryContext, DiscoveryError, DiscoveryOptions, ErrorPolicy, HandlerRegistry,
    PackageDiscovery,
};
pub use realtime::{ConnectionManager, RealtimeNotice, SocketDefinition};
pub use service::{Composition, RunningService, Services};
