//! Configuration management for package services
//!
//! Handles configuration loading (TOML or JSON) and validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::identity::Identity;
use crate::auth::roles::{default_access_levels, default_roles, AccessControl, AccessLevelSpec};
use crate::package::loader::DEFAULT_PATTERNS;
use crate::package::policy::ErrorPolicy;
use crate::package::registry::manifest::DEFAULT_MANIFEST_FILE;
use crate::package::registry::walker::{DependencyWalker, DEFAULT_INSTALL_DIR};
use crate::package::registry::DiscoveryOptions;

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `package_services=debug`
    /// (`RUST_LOG` takes precedence)
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// How discovery errors propagate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicyConfig {
    /// Raise every error and abort (development/test)
    #[default]
    FailFast,
    /// Log recoverable errors and keep going (production)
    Report,
}

impl ErrorPolicyConfig {
    pub fn to_policy(self) -> ErrorPolicy {
        match self {
            ErrorPolicyConfig::FailFast => ErrorPolicy::FailFast,
            ErrorPolicyConfig::Report => ErrorPolicy::logged(),
        }
    }
}

/// Authorization and identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Ordered roles, `public` first
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,

    /// Access level name to `"*"` or a list of admitted roles
    #[serde(default = "default_access_levels")]
    pub access_levels: BTreeMap<String, AccessLevelSpec>,

    /// Static token table (token to identity)
    #[serde(default)]
    pub tokens: HashMap<String, Identity>,

    /// Base URL of a remote identity provider (`remote-auth` feature)
    #[serde(default)]
    pub auth_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            access_levels: default_access_levels(),
            tokens: HashMap::new(),
            auth_url: None,
        }
    }
}

/// Realtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Peer service URLs to connect to as a client
    #[serde(default)]
    pub connections: Vec<String>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listening address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Mount point of every package route
    #[serde(default = "default_rest_api_root")]
    pub rest_api_root: String,

    /// Root package directory; its dependency graph is walked
    #[serde(default)]
    pub main: Option<PathBuf>,

    /// Extra package directories (not walked)
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Contribution module glob patterns, relative to each package
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Packages that contribute nothing
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Directory holding installed dependencies
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Manifest file name
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    #[serde(default)]
    pub error_policy: ErrorPolicyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub socket: SocketConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_rest_api_root() -> String {
    "/".to_string()
}

fn default_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_install_dir() -> String {
    DEFAULT_INSTALL_DIR.to_string()
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            rest_api_root: default_rest_api_root(),
            main: None,
            directories: Vec::new(),
            patterns: default_patterns(),
            ignore: Vec::new(),
            install_dir: default_install_dir(),
            manifest_file: default_manifest_file(),
            error_policy: ErrorPolicyConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML or JSON file (by extension, TOML otherwise)
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: ServiceConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.access_control()?;

        if self.patterns.is_empty() {
            return Err(anyhow::anyhow!(
                "patterns must list at least one module glob"
            ));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(anyhow::anyhow!("manifest_file must not be empty"));
        }
        if self.install_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("install_dir must not be empty"));
        }

        Ok(())
    }

    /// Role and access level tables
    pub fn access_control(&self) -> anyhow::Result<Arc<AccessControl>> {
        let control = AccessControl::new(&self.auth.roles, &self.auth.access_levels)?;
        Ok(Arc::new(control))
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            main: self.main.clone(),
            directories: self.directories.clone(),
            patterns: self.patterns.clone(),
            ignore: self.ignore.clone(),
        }
    }

    pub fn walker(&self) -> DependencyWalker {
        DependencyWalker::new(self.manifest_file.clone(), self.install_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen.port(), 8000);
        assert_eq!(config.rest_api_root, "/");
        assert_eq!(config.patterns, vec!["api/*.toml", "api/*.json"]);
        assert_eq!(config.error_policy, ErrorPolicyConfig::FailFast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("services.toml");
        fs::write(
            &path,
            r#"
            listen = "0.0.0.0:9000"
            main = "/srv/app"
            error_policy = "report"

            [auth]
            roles = ["public", "user"]

            [auth.access_levels]
            public = "*"
            user = ["user"]

            [auth.tokens.secret]
            username = "ada"
            role = "user"

            [socket]
            connections = ["ws://peer:8000"]
            "#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.error_policy, ErrorPolicyConfig::Report);
        assert_eq!(config.auth.roles.len(), 2);
        assert_eq!(config.auth.tokens["secret"].role.as_deref(), Some("user"));
        assert_eq!(config.socket.connections, vec!["ws://peer:8000"]);
        assert_eq!(config.install_dir, "node_modules");
    }

    #[test]
    fn test_json_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("services.json");
        fs::write(&path, r#"{"rest_api_root": "/api", "ignore": ["legacy"]}"#).unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.rest_api_root, "/api");
        assert_eq!(config.discovery_options().ignore, vec!["legacy"]);
    }

    #[test]
    fn test_validate_rejects_bad_role_list() {
        let mut config = ServiceConfig::default();
        config.auth.roles = vec!["user".into(), "public".into()];
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.auth.roles = (0..32).map(|i| format!("r{}", i)).collect();
        config.auth.roles[0] = "public".into();
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config
            .auth
            .access_levels
            .insert("ops".into(), AccessLevelSpec::roles(["operator"]));
        assert!(config.validate().is_err());
    }
}
