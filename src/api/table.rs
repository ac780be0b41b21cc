//! Per-package contribution tables
//!
//! Every table is keyed by package name and remembers the order in which
//! packages were first seen, which is discovery order.

use std::sync::Arc;

use crate::api::route::RouteDefinition;
use crate::package::registry::manifest::PackageManifest;
use crate::realtime::event::ConnectHandler;
use crate::realtime::socket::SocketDefinition;

/// Ordered mapping from package name to its contributions
#[derive(Debug, Clone)]
pub struct PackageTable<T> {
    entries: Vec<(String, Vec<T>)>,
}

impl<T> Default for PackageTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> PackageTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `package`, created empty on first use
    pub fn entry(&mut self, package: &str) -> &mut Vec<T> {
        let index = match self.entries.iter().position(|(name, _)| name == package) {
            Some(index) => index,
            None => {
                self.entries.push((package.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn push(&mut self, package: &str, item: T) {
        self.entry(package).push(item);
    }

    pub fn get(&self, package: &str) -> Option<&[T]> {
        self.entries
            .iter()
            .find(|(name, _)| name == package)
            .map(|(_, items)| items.as_slice())
    }

    pub fn contains(&self, package: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == package)
    }

    /// Package names in discovery order
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.entries
            .iter()
            .map(|(name, items)| (name.as_str(), items.as_slice()))
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of contributions across all packages
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, items)| items.len()).sum()
    }
}

/// Routes by package
pub type RouteTable = PackageTable<RouteDefinition>;

/// Socket definitions by package
pub type SocketTable = PackageTable<Arc<SocketDefinition>>;

/// `onConnect` handlers by package
pub type ConnectTable = PackageTable<Arc<dyn ConnectHandler>>;

/// Manifests by package name; the first manifest seen for a name is kept
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    entries: Vec<(String, PackageManifest)>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a manifest; returns `false` if the name was already present
    pub fn insert(&mut self, package: &str, manifest: PackageManifest) -> bool {
        if self.get(package).is_some() {
            return false;
        }
        self.entries.push((package.to_string(), manifest));
        true
    }

    pub fn get(&self, package: &str) -> Option<&PackageManifest> {
        self.entries
            .iter()
            .find(|(name, _)| name == package)
            .map(|(_, manifest)| manifest)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageManifest)> {
        self.entries
            .iter()
            .map(|(name, manifest)| (name.as_str(), manifest))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_order_is_first_seen() {
        let mut table: PackageTable<u32> = PackageTable::new();
        table.push("b", 1);
        table.push("a", 2);
        table.push("b", 3);

        assert_eq!(table.packages().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(table.get("b"), Some(&[1, 3][..]));
        assert_eq!(table.total(), 3);
        assert!(table.get("c").is_none());
    }

    #[test]
    fn test_manifest_set_keeps_first() {
        let mut set = ManifestSet::new();
        let mut first = PackageManifest::new("auth");
        first.version = Some("1.0.0".into());
        assert!(set.insert("auth", first));
        assert!(!set.insert("auth", PackageManifest::new("auth")));
        assert_eq!(set.get("auth").unwrap().version.as_deref(), Some("1.0.0"));
    }
}
