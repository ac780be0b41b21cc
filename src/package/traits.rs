//! Package system error types
//!
//! Every discovery-time failure is a [`DiscoveryError`]. The variants fall into
//! three operator-facing classes (see [`ErrorClass`]) which decide how the
//! configured [`ErrorPolicy`](crate::package::policy::ErrorPolicy) treats them.

use std::path::PathBuf;
use thiserror::Error;

/// Operator-facing classification of a discovery error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed manifest, missing name, missing dependency, unreadable files.
    /// Fatal to the affected branch of the package graph.
    Configuration,
    /// Malformed route/socket definition or module export. Recoverable.
    Validation,
    /// Two packages claiming the same path and method. Recoverable.
    Conflict,
}

/// Package discovery and composition errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{0} must contain a package")]
    NotAPackage(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse: \"{path}\". {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("{0} is missing a `name` property")]
    MissingName(PathBuf),

    #[error("Package dependency: \"{name}\" does not exist in \"{path}\". Make sure it is installed!")]
    DependencyMissing { name: String, path: PathBuf },

    #[error("Invalid module pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to load module \"{path}\": {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("The 'Config' or 'config' property exported by the module \"{path}\" must name a registered config callback")]
    ConfigNotCallable { path: PathBuf },

    #[error("{0}")]
    InvalidRoute(String),

    #[error("{0}")]
    InvalidSocket(String),

    #[error("Invalid HTTP method \"{method}\" specified for route {path} from package {package}")]
    InvalidMethod {
        method: String,
        path: String,
        package: String,
    },

    #[error("Unknown access level \"{level}\" for route {path} from package {package}")]
    UnknownAccessLevel {
        level: String,
        path: String,
        package: String,
    },

    #[error("Duplicate route: {method} {path} is declared by package \"{existing}\" and package \"{conflicting}\"")]
    DuplicateRoute {
        method: String,
        path: String,
        existing: String,
        conflicting: String,
    },

    #[error("Config callback from package \"{package}\" failed: {reason}")]
    ConfigCallback { package: String, reason: String },

    #[error("Services cannot be modified after the server has started")]
    AlreadyStarted,

    #[error("{} discovery error(s): {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<DiscoveryError>),
}

fn join_messages(errors: &[DiscoveryError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl DiscoveryError {
    /// Classify the error for the error policy
    pub fn class(&self) -> ErrorClass {
        match self {
            DiscoveryError::InvalidRoute(_)
            | DiscoveryError::InvalidSocket(_)
            | DiscoveryError::ConfigNotCallable { .. }
            | DiscoveryError::InvalidMethod { .. }
            | DiscoveryError::UnknownAccessLevel { .. }
            | DiscoveryError::ConfigCallback { .. } => ErrorClass::Validation,
            DiscoveryError::DuplicateRoute { .. } => ErrorClass::Conflict,
            _ => ErrorClass::Configuration,
        }
    }

    /// Whether the error may be reported and skipped when a sink is configured
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.class(), ErrorClass::Configuration)
    }

    /// Flatten nested aggregates into a single list
    pub fn into_errors(self) -> Vec<DiscoveryError> {
        match self {
            DiscoveryError::Aggregate(errors) => {
                errors.into_iter().flat_map(|e| e.into_errors()).collect()
            }
            other => vec![other],
        }
    }

    /// Build an error from a list, collapsing a single entry
    ///
    /// Returns `None` for an empty list.
    pub fn from_errors(mut errors: Vec<DiscoveryError>) -> Option<DiscoveryError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(DiscoveryError::Aggregate(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_route_message_names_both_packages() {
        let err = DiscoveryError::DuplicateRoute {
            method: "GET".into(),
            path: "/shared/x".into(),
            existing: "alpha".into(),
            conflicting: "beta".into(),
        };
        let message = err.to_string();
        assert!(message.contains("GET"));
        assert!(message.contains("/shared/x"));
        assert!(message.contains("alpha"));
        assert!(message.contains("beta"));
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn test_missing_dependency_names_path() {
        let err = DiscoveryError::DependencyMissing {
            name: "storage".into(),
            path: PathBuf::from("/srv/app/node_modules/storage"),
        };
        assert!(err.to_string().contains("\"storage\""));
        assert!(err.to_string().contains("/srv/app/node_modules/storage"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_aggregate_flattening() {
        let nested = DiscoveryError::Aggregate(vec![
            DiscoveryError::MissingName(PathBuf::from("a")),
            DiscoveryError::Aggregate(vec![DiscoveryError::InvalidRoute("bad".into())]),
        ]);
        assert_eq!(nested.into_errors().len(), 2);
        assert!(DiscoveryError::from_errors(Vec::new()).is_none());
        assert!(matches!(
            DiscoveryError::from_errors(vec![DiscoveryError::InvalidRoute("x".into())]),
            Some(DiscoveryError::InvalidRoute(_))
        ));
    }
}
