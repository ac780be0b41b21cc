//! Package manifest parsing
//!
//! Handles reading `package.json` manifests and extracting the package's
//! effective (addressing) name and its package dependencies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::package::traits::DiscoveryError;

/// Dependency name to version constraint, in declaration order
pub type DependencyMap = Map<String, Value>;

/// Default manifest file name
pub const DEFAULT_MANIFEST_FILE: &str = "package.json";

/// Package manifest (`package.json` structure)
///
/// Unknown fields are ignored; only the ones relevant to discovery are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name
    #[serde(default)]
    pub name: String,
    /// Preferred over `name` for addressing when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Package version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Dependencies on other packages (name -> version constraint)
    #[serde(default, rename = "packageDependencies", skip_serializing_if = "Option::is_none")]
    pub package_dependencies: Option<DependencyMap>,
    /// Generic dependency mapping, used when `packageDependencies` is absent
    #[serde(default)]
    pub dependencies: DependencyMap,
}

impl PackageManifest {
    /// Build a manifest in code (fixtures, synthetic packages)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The lower-cased namespacing key: `namespace`, else `name`
    ///
    /// Returns `None` when neither is a non-empty string.
    pub fn effective_name(&self) -> Option<String> {
        let raw = self
            .namespace
            .as_deref()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or(self.name.as_str());
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Package dependencies used for graph traversal, in declaration order
    pub fn package_dependencies(&self) -> &DependencyMap {
        self.package_dependencies
            .as_ref()
            .unwrap_or(&self.dependencies)
    }

    /// Whether this package matches an entry of an ignore list
    pub fn is_ignored(&self, ignored: &[String]) -> bool {
        ignored.iter().any(|name| {
            self.name.eq_ignore_ascii_case(name)
                || self
                    .namespace
                    .as_deref()
                    .map_or(false, |ns| ns.eq_ignore_ascii_case(name))
        })
    }

    /// Parse manifest contents
    pub fn parse(path: &Path, contents: &str) -> Result<Self, DiscoveryError> {
        let manifest: PackageManifest =
            serde_json::from_str(contents).map_err(|e| DiscoveryError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if manifest.effective_name().is_none() {
            return Err(DiscoveryError::MissingName(path.to_path_buf()));
        }

        Ok(manifest)
    }

    /// Load the manifest of a package directory
    ///
    /// Returns `Ok(None)` when the directory has no manifest (or is not a
    /// directory at all). Parse failures and a missing name are errors.
    pub fn from_dir(directory: &Path, manifest_file: &str) -> Result<Option<Self>, DiscoveryError> {
        let path = directory.join(manifest_file);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&path, &contents).map(Some),
            Err(e) if is_absent(&e) => Ok(None),
            Err(source) => Err(DiscoveryError::Io { path, source }),
        }
    }

    /// Async variant of [`from_dir`](Self::from_dir) for the non-blocking walker
    pub async fn from_dir_async(
        directory: &Path,
        manifest_file: &str,
    ) -> Result<Option<Self>, DiscoveryError> {
        let path = directory.join(manifest_file);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&path, &contents).map(Some),
            Err(e) if is_absent(&e) => Ok(None),
            Err(source) => Err(DiscoveryError::Io { path, source }),
        }
    }
}

/// ENOENT and ENOTDIR both mean "no package here"
fn is_absent(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    {
        // ENOTDIR
        if error.raw_os_error() == Some(20) {
            return true;
        }
    }
    false
}

/// A visited package: its resolved directory and manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    /// Resolved (canonical when possible) package directory
    pub directory: PathBuf,
    /// Parsed manifest
    pub manifest: PackageManifest,
}

impl PackageNode {
    /// The package's namespacing key
    ///
    /// Never empty: manifests without a name are rejected at parse time.
    pub fn name(&self) -> String {
        self.manifest.effective_name().unwrap_or_default()
    }
}
