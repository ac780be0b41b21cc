//! Route model and namespacing
//!
//! A [`RouteDefinition`] is built once from a validated raw definition,
//! namespaced under its package, and not modified afterwards.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::http::context::Handler;
use crate::package::handlers::HandlerRegistry;
use crate::package::traits::DiscoveryError;
use crate::package::validation::{middleware_field, validate_route, DefinitionValidator};

/// A validated route
#[derive(Clone)]
pub struct RouteDefinition {
    /// Path, always starting with `/`
    pub path: String,
    /// Declared HTTP methods, in declaration order
    pub methods: Vec<String>,
    /// Handler chain, at least one entry
    pub middleware: Vec<Handler>,
    /// Names the chain was declared with (empty for routes built in code)
    pub middleware_names: Vec<String>,
    pub access_level: Option<String>,
    /// Declaring package when it differs from the namespace key (two
    /// packages may share a `namespace`)
    pub owner: Option<String>,
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("middleware", &self.middleware_names)
            .field("access_level", &self.access_level)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Listing entry for a route (`endpoints` output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub path: String,
    #[serde(rename = "httpMethod")]
    pub http_method: String,
    #[serde(rename = "accessLevel")]
    pub access_level: String,
}

impl RouteDefinition {
    /// Build a route in code
    ///
    /// The path gets a leading `/`; namespacing is left to the caller.
    pub fn new(path: impl Into<String>, method: impl Into<String>, middleware: Vec<Handler>) -> Self {
        Self {
            path: with_leading_slash(&path.into()),
            methods: vec![method.into()],
            middleware,
            middleware_names: Vec::new(),
            access_level: None,
            owner: None,
        }
    }

    pub fn with_access_level(mut self, level: impl Into<String>) -> Self {
        self.access_level = Some(level.into());
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Validate, resolve and namespace a raw definition for `package`
    pub fn from_raw(
        package: &str,
        raw: &Value,
        registry: &HandlerRegistry,
    ) -> Result<Self, DiscoveryError> {
        let check = validate_route(raw, package);
        if !check.is_valid {
            return Err(DiscoveryError::InvalidRoute(check.message));
        }

        let path = raw.get("path").and_then(Value::as_str).unwrap_or_default();
        let methods = string_list(raw.get("httpMethod"));
        let middleware_names = string_list(middleware_field(raw));

        let mut middleware = Vec::with_capacity(middleware_names.len());
        let mut unknown = Vec::new();
        for name in &middleware_names {
            match registry.middleware(name) {
                Some(handler) => middleware.push(handler),
                None => unknown.push(format!("middlewareChain references unknown handler \"{}\"", name)),
            }
        }
        if !unknown.is_empty() {
            return Err(DiscoveryError::InvalidRoute(DefinitionValidator::message(
                "route", raw, package, &unknown,
            )));
        }

        Ok(Self {
            path: namespace_path(package, path),
            methods,
            middleware,
            middleware_names,
            access_level: raw
                .get("accessLevel")
                .and_then(Value::as_str)
                .map(str::to_string),
            owner: None,
        })
    }

    /// The same route namespaced under `package`
    pub fn namespaced(mut self, package: &str) -> Self {
        self.path = namespace_path(package, &self.path);
        self
    }

    /// One summary per declared method
    pub fn summaries(&self) -> impl Iterator<Item = RouteSummary> + '_ {
        self.methods.iter().map(move |method| RouteSummary {
            path: self.path.clone(),
            http_method: method.to_uppercase(),
            access_level: self
                .access_level
                .clone()
                .unwrap_or_else(|| crate::auth::roles::DEFAULT_ACCESS_LEVEL.to_string()),
        })
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Collapse repeated `/` without breaking a `://` separator
pub fn normalize(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut previous_slash = false;
    for c in url.chars() {
        if c == '/' {
            if previous_slash && !out.ends_with(":/") {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

/// Prefix `path` with `/<package>` unless it is already under it
///
/// Idempotent: namespacing an already namespaced path returns it unchanged.
pub fn namespace_path(package: &str, path: &str) -> String {
    let path = normalize(&with_leading_slash(path));
    let prefix = format!("/{}", package);
    if path == prefix || path.starts_with(&format!("{}/", prefix)) {
        return path;
    }
    normalize(&format!("{}/{}", prefix, path))
}

/// Join a mount point and a route path
pub fn mount_path(mount: &str, path: &str) -> String {
    let joined = normalize(&format!("/{}/{}", mount, path));
    if joined.len() > 1 {
        joined.trim_end_matches('/').to_string()
    } else {
        joined
    }
}
