//! Contribution module loading
//!
//! A contribution module is a TOML or JSON file inside a package, matched by
//! the configured glob patterns. It either carries its exports inline or
//! names a registered factory (`factory = "name"`) that produces them. Both
//! forms are resolved once into [`ModuleExports`].

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::package::handlers::HandlerRegistry;
use crate::package::traits::DiscoveryError;
use crate::utils::lock_or_recover;

/// Default module patterns, relative to the package directory
pub const DEFAULT_PATTERNS: [&str; 2] = ["api/*.toml", "api/*.json"];

/// Where a module's exports come from
#[derive(Debug, Clone, PartialEq)]
pub enum ContributionSource {
    /// Exports written in the module file
    StaticData(Value),
    /// Exports produced by the named registered factory
    Factory(String),
}

/// A module's exports in normalized form
///
/// Definitions stay raw JSON until validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleExports {
    pub routes: Vec<Value>,
    pub sockets: Vec<Value>,
    /// Name of the config callback (anything else is reported as not callable)
    pub config: Option<Value>,
    /// Name of the connect handler
    pub on_connect: Option<Value>,
}

impl ModuleExports {
    /// Normalize an export object
    ///
    /// Accepts `routes`/`Routes`, `sockets`/`Sockets`, `config`/`Config`
    /// and `onConnect`/`on_connect`. A single definition object counts as a
    /// one-element list.
    pub fn from_value(path: &Path, value: Value) -> Result<Self, DiscoveryError> {
        let Value::Object(mut map) = value else {
            return Err(DiscoveryError::ModuleLoad {
                path: path.to_path_buf(),
                reason: "module must export a table of contributions".to_string(),
            });
        };

        Ok(Self {
            routes: definitions(take_either(&mut map, "routes", "Routes")),
            sockets: definitions(take_either(&mut map, "sockets", "Sockets")),
            config: take_either(&mut map, "config", "Config").filter(|v| !v.is_null()),
            on_connect: take_either(&mut map, "onConnect", "on_connect").filter(|v| !v.is_null()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
            && self.sockets.is_empty()
            && self.config.is_none()
            && self.on_connect.is_none()
    }
}

fn take_either(map: &mut Map<String, Value>, key: &str, alias: &str) -> Option<Value> {
    map.remove(key).or_else(|| map.remove(alias))
}

fn definitions(value: Option<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    }
}

/// Module file discovery and parsing
pub struct ModuleLoader;

impl ModuleLoader {
    /// Module files of a package, sorted, each listed once
    pub fn find_modules(directory: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut found = BTreeSet::new();
        for pattern in patterns {
            let full = directory.join(pattern);
            let entries = glob::glob(&full.to_string_lossy()).map_err(|e| {
                DiscoveryError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }
            })?;
            for entry in entries {
                let path = entry.map_err(|e| DiscoveryError::Io {
                    path: e.path().to_path_buf(),
                    source: std::io::Error::new(e.error().kind(), e.to_string()),
                })?;
                if path.is_file() {
                    found.insert(path);
                }
            }
        }
        debug!("Found {} module(s) in {}", found.len(), directory.display());
        Ok(found.into_iter().collect())
    }

    /// Parse a module file into its contribution source
    pub fn read_source(path: &Path) -> Result<ContributionSource, DiscoveryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_source(path, &contents)
    }

    /// Parse module contents; the format follows the file extension
    pub fn parse_source(path: &Path, contents: &str) -> Result<ContributionSource, DiscoveryError> {
        let load_error = |reason: String| DiscoveryError::ModuleLoad {
            path: path.to_path_buf(),
            reason,
        };

        let value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                let parsed: toml::Value =
                    toml::from_str(contents).map_err(|e| load_error(e.to_string()))?;
                serde_json::to_value(parsed).map_err(|e| load_error(e.to_string()))?
            }
            Some("json") => serde_json::from_str(contents).map_err(|e| load_error(e.to_string()))?,
            other => {
                return Err(load_error(format!(
                    "unsupported module format {:?}",
                    other.unwrap_or("")
                )))
            }
        };

        match value.get("factory") {
            Some(Value::String(name)) => Ok(ContributionSource::Factory(name.clone())),
            Some(_) => Err(load_error("`factory` must name a registered factory".to_string())),
            None => Ok(ContributionSource::StaticData(value)),
        }
    }

    /// Resolve a source into exports, invoking the factory if there is one
    pub fn resolve(
        path: &Path,
        source: ContributionSource,
        registry: &HandlerRegistry,
    ) -> Result<ModuleExports, DiscoveryError> {
        let value = match source {
            ContributionSource::StaticData(value) => value,
            ContributionSource::Factory(name) => {
                let factory = registry.factory(&name).ok_or_else(|| DiscoveryError::ModuleLoad {
                    path: path.to_path_buf(),
                    reason: format!("unknown factory \"{}\"", name),
                })?;
                factory()
            }
        };
        ModuleExports::from_value(path, value)
    }
}

/// Resolved exports by module path
///
/// Callers always receive a copy, so namespacing or other edits made during
/// one discovery pass never leak into the next.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: Mutex<HashMap<PathBuf, ModuleExports>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports of the module at `path`, loading it on first use
    pub fn load(&self, path: &Path, registry: &HandlerRegistry) -> Result<ModuleExports, DiscoveryError> {
        if let Some(exports) = lock_or_recover(&self.entries).get(path) {
            return Ok(exports.clone());
        }

        let source = ModuleLoader::read_source(path)?;
        let exports = ModuleLoader::resolve(path, source, registry)?;
        info!("Loaded module {}", path.display());
        lock_or_recover(&self.entries).insert(path.to_path_buf(), exports.clone());
        Ok(exports)
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every cached module
    pub fn clear(&self) {
        lock_or_recover(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn patterns() -> Vec<String> {
        DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_find_modules_matches_patterns() {
        let tmp = TempDir::new().unwrap();
        let api = tmp.path().join("api");
        fs::create_dir_all(&api).unwrap();
        fs::write(api.join("b.toml"), "").unwrap();
        fs::write(api.join("a.json"), "{}").unwrap();
        fs::write(api.join("notes.md"), "").unwrap();

        let found = ModuleLoader::find_modules(tmp.path(), &patterns()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.toml"]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = ModuleLoader::find_modules(tmp.path(), &["api/[*.toml".to_string()]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_toml_module_parses_to_static_data() {
        let source = ModuleLoader::parse_source(
            Path::new("api/items.toml"),
            r#"
            config = "setup"

            [[routes]]
            path = "/items"
            httpMethod = "GET"
            middleware = ["list"]
            "#,
        )
        .unwrap();
        let exports = ModuleLoader::resolve(Path::new("api/items.toml"), source, &HandlerRegistry::new())
            .unwrap();
        assert_eq!(exports.routes.len(), 1);
        assert_eq!(exports.routes[0]["path"], "/items");
        assert_eq!(exports.config, Some(json!("setup")));
    }

    #[test]
    fn test_factory_module_resolves_through_registry() {
        let path = Path::new("api/dyn.json");
        let source = ModuleLoader::parse_source(path, r#"{"factory": "dynamic"}"#).unwrap();
        assert_eq!(source, ContributionSource::Factory("dynamic".into()));

        let mut registry = HandlerRegistry::new();
        registry.register_factory(
            "dynamic",
            Arc::new(|| json!({"Routes": {"path": "/d", "httpMethod": "GET", "middleware": "h"}})),
        );
        let exports = ModuleLoader::resolve(path, source.clone(), &registry).unwrap();
        assert_eq!(exports.routes.len(), 1);

        let err = ModuleLoader::resolve(path, source, &HandlerRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("unknown factory"));
    }

    #[test]
    fn test_cache_returns_copies() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.json");
        fs::write(&path, r#"{"routes": [{"path": "x"}]}"#).unwrap();

        let cache = ModuleCache::new();
        let registry = HandlerRegistry::new();
        let mut first = cache.load(&path, &registry).unwrap();
        first.routes[0]["path"] = json!("/mutated/x");

        let second = cache.load(&path, &registry).unwrap();
        assert_eq!(second.routes[0]["path"], "x");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_non_table_export_is_rejected() {
        let err = ModuleExports::from_value(Path::new("m.json"), json!([1, 2])).unwrap_err();
        assert!(matches!(err, DiscoveryError::ModuleLoad { .. }));
    }
}
