//! Package dependency graph traversal
//!
//! Walks the graph rooted at a package directory: root, its declared package
//! dependencies, their dependencies, and so on. Every distinct package
//! directory is visited exactly once, keyed on its canonical path, so diamond
//! dependencies are walked once and cycles terminate.
//!
//! Two modes share the same duplicate guard:
//! - [`DependencyWalker::walk`] blocks until the whole graph is visited and
//!   stops at the first error.
//! - [`DependencyWalker::spawn_walk`] schedules each node as a tokio task and
//!   yields one [`VisitSignal`] per node as it completes. A node's children are
//!   only scheduled once the node itself has been read. Errors are reported per
//!   branch; siblings keep going.
//!
//! [`DependencyWalker::walk_async`] hands nodes to its visitor in the same
//! order as the blocking walk, whatever order the tasks finished in.

use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::package::registry::manifest::{PackageManifest, PackageNode, DEFAULT_MANIFEST_FILE};
use crate::package::traits::DiscoveryError;
use crate::utils::lock_or_recover;

/// Default directory holding installed dependencies
pub const DEFAULT_INSTALL_DIR: &str = "node_modules";

/// Completion signal for one node of a non-blocking walk
pub type VisitSignal = Result<PackageNode, DiscoveryError>;

/// Outcome of a walk that keeps going past branch failures
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Visited packages in visit order
    pub nodes: Vec<PackageNode>,
    /// One entry per failed branch
    pub errors: Vec<DiscoveryError>,
}

impl WalkReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a result, aggregating all branch errors
    pub fn into_result(self) -> Result<Vec<PackageNode>, DiscoveryError> {
        match DiscoveryError::from_errors(self.errors) {
            None => Ok(self.nodes),
            Some(err) => Err(err),
        }
    }
}

/// Dependency graph walker
#[derive(Debug, Clone)]
pub struct DependencyWalker {
    manifest_file: String,
    install_dir: String,
}

impl Default for DependencyWalker {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_FILE, DEFAULT_INSTALL_DIR)
    }
}

impl DependencyWalker {
    /// Create a walker reading `manifest_file` and resolving dependencies
    /// under `install_dir`
    pub fn new(manifest_file: impl Into<String>, install_dir: impl Into<String>) -> Self {
        Self {
            manifest_file: manifest_file.into(),
            install_dir: install_dir.into(),
        }
    }

    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }

    /// Read the package at `directory`, failing when it has no manifest
    pub fn read_package(&self, directory: &Path) -> Result<PackageNode, DiscoveryError> {
        match PackageManifest::from_dir(directory, &self.manifest_file)? {
            Some(manifest) => Ok(PackageNode {
                directory: canonical(directory),
                manifest,
            }),
            None => Err(DiscoveryError::NotAPackage(directory.to_path_buf())),
        }
    }

    /// Locate an installed dependency
    ///
    /// Tries `<parent>/<install_dir>/<name>` first, then the hoisted
    /// `<root>/<install_dir>/<name>`. The missing-dependency error names the
    /// hoisted location.
    pub fn resolve_dependency(
        &self,
        root: &Path,
        parent: &Path,
        name: &str,
    ) -> Result<PathBuf, DiscoveryError> {
        let nested = parent.join(&self.install_dir).join(name);
        if nested.join(&self.manifest_file).is_file() {
            return Ok(nested);
        }
        let hoisted = root.join(&self.install_dir).join(name);
        if hoisted.join(&self.manifest_file).is_file() {
            return Ok(hoisted);
        }
        Err(DiscoveryError::DependencyMissing {
            name: name.to_string(),
            path: hoisted,
        })
    }

    /// Blocking, fail-fast walk
    ///
    /// Calls `visit` once per distinct package, parents before their
    /// dependencies, dependencies in manifest order. The first error (from
    /// the walk or from `visit`) aborts the walk.
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> Result<Vec<PackageNode>, DiscoveryError>
    where
        F: FnMut(&PackageNode) -> Result<(), DiscoveryError>,
    {
        let root = canonical(root);
        let mut visited = HashSet::new();
        let mut nodes = Vec::new();
        let mut on_error = |err: DiscoveryError| Err(err);
        self.walk_node(&root, &root, &mut visited, &mut nodes, &mut visit, &mut on_error)?;
        info!("Walked {} package(s) from {}", nodes.len(), root.display());
        Ok(nodes)
    }

    /// Blocking walk that abandons only the failing branch
    ///
    /// A package that cannot be read, whose dependency is missing, or whose
    /// `visit` call fails is recorded in the report and its own dependencies
    /// are not walked. Siblings are unaffected.
    pub fn walk_collect<F>(&self, root: &Path, mut visit: F) -> WalkReport
    where
        F: FnMut(&PackageNode) -> Result<(), DiscoveryError>,
    {
        let root = canonical(root);
        let mut visited = HashSet::new();
        let mut nodes = Vec::new();
        let mut errors = Vec::new();
        let mut on_error = |err: DiscoveryError| {
            errors.push(err);
            Ok(())
        };
        // on_error never fails, so neither does the walk
        let _ = self.walk_node(&root, &root, &mut visited, &mut nodes, &mut visit, &mut on_error);
        WalkReport { nodes, errors }
    }

    fn walk_node<F, E>(
        &self,
        root: &Path,
        directory: &Path,
        visited: &mut HashSet<PathBuf>,
        nodes: &mut Vec<PackageNode>,
        visit: &mut F,
        on_error: &mut E,
    ) -> Result<(), DiscoveryError>
    where
        F: FnMut(&PackageNode) -> Result<(), DiscoveryError>,
        E: FnMut(DiscoveryError) -> Result<(), DiscoveryError>,
    {
        if !visited.insert(canonical(directory)) {
            return Ok(());
        }

        let node = match self.read_package(directory) {
            Ok(node) => node,
            Err(err) => return on_error(err),
        };
        debug!("Visiting package {} at {}", node.name(), node.directory.display());

        if let Err(err) = visit(&node) {
            return on_error(err);
        }

        let dependencies: Vec<String> = node
            .manifest
            .package_dependencies()
            .keys()
            .cloned()
            .collect();
        let parent = node.directory.clone();
        nodes.push(node);

        for name in dependencies {
            match self.resolve_dependency(root, &parent, &name) {
                Ok(path) => self.walk_node(root, &path, visited, nodes, visit, on_error)?,
                Err(err) => on_error(err)?,
            }
        }
        Ok(())
    }

    /// Start a non-blocking walk
    ///
    /// Returns a receiver yielding one signal per visited node (or failed
    /// branch) in completion order. The channel closes once every scheduled
    /// visit has finished. Must be called within a tokio runtime.
    pub fn spawn_walk(&self, root: &Path) -> mpsc::UnboundedReceiver<VisitSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = canonical(root);
        let walk = Arc::new(AsyncWalk {
            walker: self.clone(),
            root: root.clone(),
            visited: Mutex::new(HashSet::new()),
        });

        if walk.claim(&root) {
            tokio::spawn(AsyncWalk::visit(walk, root, tx));
        }
        rx
    }

    /// Non-blocking walk with error aggregation
    ///
    /// Manifests are read concurrently. Once every task has finished, `visit`
    /// runs on the caller's task for each node in blocking-walk order: parents
    /// before their dependencies, dependencies in manifest order. Every branch
    /// failure and every `visit` failure is collected; the result is an error
    /// if any occurred.
    pub async fn walk_async<F>(
        &self,
        root: &Path,
        mut visit: F,
    ) -> Result<Vec<PackageNode>, DiscoveryError>
    where
        F: FnMut(&PackageNode) -> Result<(), DiscoveryError>,
    {
        let mut rx = self.spawn_walk(root);
        let mut completed = HashMap::new();
        let mut report = WalkReport::default();

        while let Some(signal) = rx.recv().await {
            match signal {
                Ok(node) => {
                    completed.insert(node.directory.clone(), node);
                }
                Err(err) => report.errors.push(err),
            }
        }
        // Branch failures arrive in completion order too
        report.errors.sort_by_cached_key(|err| err.to_string());

        let walker = self.clone();
        let root = canonical(root);
        let ordered = tokio::task::spawn_blocking(move || walker.preorder(&root, completed))
            .await
            .map_err(|join| DiscoveryError::ModuleLoad {
                path: PathBuf::new(),
                reason: join.to_string(),
            })?;

        for node in ordered {
            match visit(&node) {
                Ok(()) => report.nodes.push(node),
                Err(err) => report.errors.push(err),
            }
        }

        info!(
            "Walked {} package(s) asynchronously with {} error(s)",
            report.nodes.len(),
            report.errors.len()
        );
        report.into_result()
    }

    /// Arrange the nodes of a finished non-blocking walk in blocking-walk order
    ///
    /// Dependencies are resolved again from each parent, so a package shared
    /// by two parents lands under the first one in manifest order, not under
    /// whichever claimed it first.
    fn preorder(
        &self,
        root: &Path,
        mut completed: HashMap<PathBuf, PackageNode>,
    ) -> Vec<PackageNode> {
        let mut ordered = Vec::with_capacity(completed.len());
        self.collect_preorder(root, root, &mut completed, &mut ordered);

        // Unreachable leftovers should not exist; keep them, sorted by path
        let mut rest: Vec<PackageNode> = completed.into_values().collect();
        rest.sort_by(|a, b| a.directory.cmp(&b.directory));
        ordered.extend(rest);
        ordered
    }

    fn collect_preorder(
        &self,
        root: &Path,
        directory: &Path,
        completed: &mut HashMap<PathBuf, PackageNode>,
        ordered: &mut Vec<PackageNode>,
    ) {
        let Some(node) = completed.remove(directory) else {
            return;
        };
        let dependencies: Vec<String> = node
            .manifest
            .package_dependencies()
            .keys()
            .cloned()
            .collect();
        let parent = node.directory.clone();
        ordered.push(node);

        for name in dependencies {
            if let Ok(path) = self.resolve_dependency(root, &parent, &name) {
                self.collect_preorder(root, &canonical(&path), completed, ordered);
            }
        }
    }
}

/// Shared state of one non-blocking walk
struct AsyncWalk {
    walker: DependencyWalker,
    root: PathBuf,
    visited: Mutex<HashSet<PathBuf>>,
}

impl AsyncWalk {
    /// Atomically check-and-set the visited guard
    fn claim(&self, key: &Path) -> bool {
        lock_or_recover(&self.visited).insert(key.to_path_buf())
    }

    /// Boxed because the task spawns itself for each dependency
    fn visit(
        walk: Arc<Self>,
        directory: PathBuf,
        tx: mpsc::UnboundedSender<VisitSignal>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let manifest =
                match PackageManifest::from_dir_async(&directory, &walk.walker.manifest_file).await {
                    Ok(Some(manifest)) => manifest,
                    Ok(None) => {
                        let _ = tx.send(Err(DiscoveryError::NotAPackage(directory.clone())));
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                };

            let dependencies: Vec<String> = manifest.package_dependencies().keys().cloned().collect();
            let node = PackageNode {
                directory: directory.clone(),
                manifest,
            };
            debug!("Visited package {} at {}", node.name(), directory.display());
            if tx.send(Ok(node)).is_err() {
                // Receiver gone, nobody is interested in the rest of the graph
                return;
            }

            for name in dependencies {
                let resolved = {
                    let walker = walk.walker.clone();
                    let root = walk.root.clone();
                    let parent = directory.clone();
                    tokio::task::spawn_blocking(move || {
                        walker
                            .resolve_dependency(&root, &parent, &name)
                            .map(|path| canonical(&path))
                    })
                    .await
                };

                match resolved {
                    Ok(Ok(child)) => {
                        if walk.claim(&child) {
                            tokio::spawn(AsyncWalk::visit(Arc::clone(&walk), child, tx.clone()));
                        }
                    }
                    Ok(Err(err)) => {
                        let _ = tx.send(Err(err));
                    }
                    Err(join) => {
                        let _ = tx.send(Err(DiscoveryError::ModuleLoad {
                            path: directory.clone(),
                            reason: join.to_string(),
                        }));
                    }
                }
            }
        })
    }
}

/// Stable identity of a package directory
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
