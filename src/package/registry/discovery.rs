//! Package discovery
//!
//! Walks the package graph and, for every visited package, loads its
//! contribution modules and turns their raw exports into validated,
//! namespaced definitions collected per package.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::config_runner::ConfigFn;
use crate::api::route::RouteDefinition;
use crate::api::table::{ConnectTable, ManifestSet, RouteTable, SocketTable};
use crate::package::context::DiscoveryContext;
use crate::package::loader::{ModuleLoader, DEFAULT_PATTERNS};
use crate::package::registry::manifest::{PackageManifest, PackageNode};
use crate::package::traits::DiscoveryError;
use crate::realtime::event::ConnectHandler;
use crate::realtime::socket::SocketDefinition;

/// Which packages to discover and how to find their modules
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Root package; its dependency graph is walked
    pub main: Option<PathBuf>,
    /// Extra package directories, not walked; missing manifests are skipped
    pub directories: Vec<PathBuf>,
    /// Module glob patterns relative to each package
    pub patterns: Vec<String>,
    /// Package names that contribute nothing
    pub ignore: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            main: None,
            directories: Vec::new(),
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            ignore: Vec::new(),
        }
    }
}

impl DiscoveryOptions {
    pub fn with_main(mut self, main: impl Into<PathBuf>) -> Self {
        self.main = Some(main.into());
        self
    }
}

/// A package's config callback
#[derive(Clone)]
pub struct ConfigEntry {
    pub package: String,
    /// Module that exported the callback
    pub source: PathBuf,
    pub callback: Arc<dyn ConfigFn>,
}

impl std::fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEntry")
            .field("package", &self.package)
            .field("source", &self.source)
            .finish()
    }
}

/// Contributions of a single package
#[derive(Default)]
pub struct PackageContributions {
    pub routes: Vec<RouteDefinition>,
    pub sockets: Vec<Arc<SocketDefinition>>,
    pub configs: Vec<ConfigEntry>,
    pub on_connect: Vec<Arc<dyn ConnectHandler>>,
}

/// Result of a discovery pass
#[derive(Default)]
pub struct DiscoveredPackages {
    pub manifests: ManifestSet,
    pub routes: RouteTable,
    pub sockets: SocketTable,
    pub on_connect: ConnectTable,
    /// Config callbacks in discovery order
    pub configs: Vec<ConfigEntry>,
    /// Every visited package directory, ignored ones included
    pub visited: Vec<PathBuf>,
}

impl DiscoveredPackages {
    /// Merge one package's contributions
    ///
    /// Directories with the same effective name share one entry: routes and
    /// callbacks accumulate, the first manifest is kept. Socket definitions
    /// belong to the first package of the namespace; later packages' sockets
    /// are dropped, so no event gets two listeners on one connection.
    fn merge(&mut self, name: &str, manifest: &PackageManifest, contributions: PackageContributions) {
        let first = self.manifests.insert(name, manifest.clone());
        self.routes.entry(name).extend(contributions.routes);
        if first {
            self.sockets.entry(name).extend(contributions.sockets);
        } else if !contributions.sockets.is_empty() {
            let owner = self.manifests.get(name).map_or("", |m| m.name.as_str());
            warn!(
                "Ignoring {} socket definition(s) of package {}: namespace {} belongs to package {}",
                contributions.sockets.len(),
                manifest.name,
                name,
                owner
            );
        }
        if !contributions.on_connect.is_empty() {
            self.on_connect.entry(name).extend(contributions.on_connect);
        }
        self.configs.extend(contributions.configs);
    }
}

/// Discovery over one context and option set
pub struct PackageDiscovery {
    context: DiscoveryContext,
    options: DiscoveryOptions,
}

impl PackageDiscovery {
    pub fn new(context: DiscoveryContext, options: DiscoveryOptions) -> Self {
        Self { context, options }
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.context
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Collect the contributions of one package directory
    ///
    /// Invalid definitions and non-callable config exports go through the
    /// error policy: reported and skipped, or raised.
    pub fn discover(&self, directory: &Path, package: &str) -> Result<PackageContributions, DiscoveryError> {
        let registry = &self.context.registry;
        let policy = &self.context.policy;
        let mut contributions = PackageContributions::default();

        for module in ModuleLoader::find_modules(directory, &self.options.patterns)? {
            let exports = self.context.cache.load(&module, registry)?;

            for raw in &exports.routes {
                match RouteDefinition::from_raw(package, raw, registry) {
                    Ok(route) => contributions.routes.push(route),
                    Err(err) => policy.handle(err)?,
                }
            }

            for raw in &exports.sockets {
                match SocketDefinition::from_raw(package, raw, registry) {
                    Ok(socket) => contributions.sockets.push(Arc::new(socket)),
                    Err(err) => policy.handle(err)?,
                }
            }

            if let Some(config) = &exports.config {
                match config.as_str().and_then(|name| registry.config(name)) {
                    Some(callback) => contributions.configs.push(ConfigEntry {
                        package: package.to_string(),
                        source: module.clone(),
                        callback,
                    }),
                    None => policy.handle(DiscoveryError::ConfigNotCallable {
                        path: module.clone(),
                    })?,
                }
            }

            if let Some(on_connect) = &exports.on_connect {
                match on_connect.as_str().and_then(|name| registry.connect_handler(name)) {
                    Some(handler) => contributions.on_connect.push(handler),
                    None => policy.handle(DiscoveryError::InvalidSocket(format!(
                        "The 'onConnect' property exported by the module \"{}\" must name a registered connect handler, got {}",
                        module.display(),
                        on_connect
                    )))?,
                }
            }
        }

        debug!(
            "Package {}: {} route(s), {} socket(s), {} config callback(s)",
            package,
            contributions.routes.len(),
            contributions.sockets.len(),
            contributions.configs.len()
        );
        Ok(contributions)
    }

    fn visit(&self, node: &PackageNode, discovered: &mut DiscoveredPackages) -> Result<(), DiscoveryError> {
        discovered.visited.push(node.directory.clone());
        if node.manifest.is_ignored(&self.options.ignore) {
            debug!("Ignoring package {}", node.name());
            return Ok(());
        }
        let name = node.name();
        let mut contributions = self.discover(&node.directory, &name)?;

        // Packages sharing a namespace keep their own identity for duplicate checks
        let owner = node.manifest.name.trim().to_lowercase();
        if owner != name {
            for route in &mut contributions.routes {
                route.owner = Some(owner.clone());
            }
        }
        discovered.merge(&name, &node.manifest, contributions);
        Ok(())
    }

    /// Extra directories: read their manifests, never walk dependencies
    fn visit_directories(&self, discovered: &mut DiscoveredPackages) -> Result<(), DiscoveryError> {
        let manifest_file = self.context.walker.manifest_file();
        for directory in &self.options.directories {
            let manifest = match PackageManifest::from_dir(directory, manifest_file) {
                Ok(Some(manifest)) => manifest,
                Ok(None) => {
                    debug!("No package in {}, skipping", directory.display());
                    continue;
                }
                Err(err) => {
                    self.fail_branch(err)?;
                    continue;
                }
            };
            let node = PackageNode {
                directory: directory.clone(),
                manifest,
            };
            if let Err(err) = self.visit(&node, discovered) {
                self.fail_branch(err)?;
            }
        }
        Ok(())
    }

    /// Under fail-fast, raise; otherwise report and abandon only this branch
    fn fail_branch(&self, err: DiscoveryError) -> Result<(), DiscoveryError> {
        if self.context.policy.is_fail_fast() {
            return Err(err);
        }
        self.context.policy.note(&err);
        Ok(())
    }

    /// Blocking discovery
    pub fn discover_all(&self) -> Result<DiscoveredPackages, DiscoveryError> {
        let mut discovered = DiscoveredPackages::default();
        self.visit_directories(&mut discovered)?;

        if let Some(main) = &self.options.main {
            let walker = &self.context.walker;
            if self.context.policy.is_fail_fast() {
                walker.walk(main, |node| self.visit(node, &mut discovered))?;
            } else {
                let report = walker.walk_collect(main, |node| self.visit(node, &mut discovered));
                for err in &report.errors {
                    warn!("Abandoned package branch: {}", err);
                    self.context.policy.note(err);
                }
            }
        }

        self.log_summary(&discovered);
        Ok(discovered)
    }

    /// Non-blocking discovery
    ///
    /// The graph walk runs as independent tasks; module loading happens here
    /// as each package completes. Branch failures are collected: under
    /// fail-fast the result is an aggregate error once every branch has
    /// finished, otherwise each failure is reported and skipped.
    pub async fn discover_all_async(&self) -> Result<DiscoveredPackages, DiscoveryError> {
        let mut discovered = DiscoveredPackages::default();
        self.visit_directories(&mut discovered)?;

        if let Some(main) = &self.options.main {
            let result = self
                .context
                .walker
                .walk_async(main, |node| self.visit(node, &mut discovered))
                .await;
            if let Err(err) = result {
                if self.context.policy.is_fail_fast() {
                    return Err(err);
                }
                for err in err.into_errors() {
                    warn!("Abandoned package branch: {}", err);
                    self.context.policy.note(&err);
                }
            }
        }

        self.log_summary(&discovered);
        Ok(discovered)
    }

    fn log_summary(&self, discovered: &DiscoveredPackages) {
        info!(
            "Discovered {} package(s): {} route(s), {} socket(s), {} config callback(s)",
            discovered.manifests.len(),
            discovered.routes.total(),
            discovered.sockets.total(),
            discovered.configs.len()
        );
    }
}
