//! Route registration
//!
//! Binds the composed route table onto a [`Router`], one `(path, method)`
//! pair at a time, in package discovery order and declaration order within
//! a package. The first package to claim a pair keeps it.

use http::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::route::mount_path;
use crate::api::table::RouteTable;
use crate::auth::gate::AuthorizationGate;
use crate::auth::roles::{AccessControl, DEFAULT_ACCESS_LEVEL};
use crate::http::router::{Binding, Router};
use crate::package::policy::ErrorPolicy;
use crate::package::traits::DiscoveryError;

/// Verbs a route may declare
pub const SUPPORTED_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

/// Outcome of one registration pass
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Newly bound `(method, path)` pairs
    pub bound: usize,
    /// Pairs the same package had already bound
    pub skipped: usize,
    /// Reported errors (empty under fail-fast, which raises instead)
    pub errors: Vec<String>,
}

/// Parse a declared verb, case-insensitively
pub fn parse_method(method: &str) -> Option<Method> {
    let upper = method.trim().to_uppercase();
    if !SUPPORTED_METHODS.contains(&upper.as_str()) {
        return None;
    }
    Method::from_bytes(upper.as_bytes()).ok()
}

/// Bind every route in `routes` onto `router` under `mount`
///
/// Each binding's chain starts with an authorization gate for the route's
/// access level. Invalid verbs, unknown access levels and duplicates across
/// packages go through the error policy; a reported duplicate is not bound.
pub fn register(
    routes: &RouteTable,
    router: &mut dyn Router,
    mount: &str,
    access: &Arc<AccessControl>,
    policy: &ErrorPolicy,
) -> Result<RegistrationReport, DiscoveryError> {
    let mut report = RegistrationReport::default();

    for (namespace, definitions) in routes.iter() {
        for route in definitions {
            let package = route.owner.as_deref().unwrap_or(namespace);
            let path = mount_path(mount, &route.path);

            let gate = match AuthorizationGate::new(Arc::clone(access), route.access_level.as_deref()) {
                Ok(gate) => gate.into_handler(),
                Err(_) => {
                    let level = route
                        .access_level
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ACCESS_LEVEL.to_string());
                    fail(
                        &mut report,
                        policy,
                        DiscoveryError::UnknownAccessLevel {
                            level,
                            path: path.clone(),
                            package: package.to_string(),
                        },
                    )?;
                    continue;
                }
            };

            for declared in &route.methods {
                let Some(method) = parse_method(declared) else {
                    fail(
                        &mut report,
                        policy,
                        DiscoveryError::InvalidMethod {
                            method: declared.clone(),
                            path: path.clone(),
                            package: package.to_string(),
                        },
                    )?;
                    continue;
                };

                if let Some(owner) = router.owner_of(&path, &method) {
                    if owner == package {
                        debug!("{} {} already bound for {}, skipping", method, path, package);
                        report.skipped += 1;
                        continue;
                    }
                    let err = DiscoveryError::DuplicateRoute {
                        method: method.to_string(),
                        path: path.clone(),
                        existing: owner.to_string(),
                        conflicting: package.to_string(),
                    };
                    fail(&mut report, policy, err)?;
                    continue;
                }

                let mut chain = Vec::with_capacity(route.middleware.len() + 1);
                chain.push(Arc::clone(&gate));
                chain.extend(route.middleware.iter().cloned());

                router.bind(Binding {
                    method,
                    pattern: path.clone(),
                    owner: package.to_string(),
                    chain,
                });
                report.bound += 1;
            }
        }
    }

    info!(
        "Registered {} route binding(s), skipped {}, {} error(s)",
        report.bound,
        report.skipped,
        report.errors.len()
    );
    Ok(report)
}

fn fail(
    report: &mut RegistrationReport,
    policy: &ErrorPolicy,
    err: DiscoveryError,
) -> Result<(), DiscoveryError> {
    let message = err.to_string();
    policy.handle(err)?;
    warn!("{}", message);
    report.errors.push(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::route::RouteDefinition;
    use crate::http::context::{middleware_fn, Flow};
    use crate::http::router::RouteMap;
    use crate::package::policy::CollectingSink;

    fn route(path: &str, method: &str) -> RouteDefinition {
        RouteDefinition::new(path, method, vec![middleware_fn(|_| Flow::Continue)])
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get"), Some(Method::GET));
        assert_eq!(parse_method(" Patch "), Some(Method::PATCH));
        assert_eq!(parse_method("FETCH"), None);
    }

    #[test]
    fn test_same_package_reregistration_is_skipped() {
        let mut routes = RouteTable::new();
        routes.push("a", route("/a/x", "GET"));
        routes.push("a", route("/a/x", "GET"));

        let mut router = RouteMap::new();
        let report = register(
            &routes,
            &mut router,
            "/",
            &Arc::new(AccessControl::standard()),
            &ErrorPolicy::FailFast,
        )
        .unwrap();
        assert_eq!(report.bound, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(router.len(), 1);
        assert_eq!(router.bindings()[0].chain.len(), 2);
    }

    #[test]
    fn test_duplicate_across_packages_first_wins() {
        let mut routes = RouteTable::new();
        routes.push("alpha", route("/shared/x", "GET"));
        routes.push("beta", route("/shared/x", "get"));

        let sink = Arc::new(CollectingSink::new());
        let mut router = RouteMap::new();
        let report = register(
            &routes,
            &mut router,
            "/",
            &Arc::new(AccessControl::standard()),
            &ErrorPolicy::Report(sink.clone()),
        )
        .unwrap();

        assert_eq!(report.bound, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(sink.messages().len(), 1);
        assert_eq!(router.owner_of("/shared/x", &Method::GET), Some("alpha"));
        assert!(report.errors[0].contains("alpha") && report.errors[0].contains("beta"));
    }

    #[test]
    fn test_invalid_method_fails_fast() {
        let mut routes = RouteTable::new();
        routes.push("a", route("/a/x", "FETCH"));

        let mut router = RouteMap::new();
        let err = register(
            &routes,
            &mut router,
            "/",
            &Arc::new(AccessControl::standard()),
            &ErrorPolicy::FailFast,
        )
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidMethod { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn test_unknown_access_level_is_reported() {
        let mut routes = RouteTable::new();
        routes.push("a", route("/a/x", "GET").with_access_level("wizards"));
        routes.push("a", route("/a/y", "GET"));

        let sink = Arc::new(CollectingSink::new());
        let mut router = RouteMap::new();
        let report = register(
            &routes,
            &mut router,
            "/api",
            &Arc::new(AccessControl::standard()),
            &ErrorPolicy::Report(sink),
        )
        .unwrap();
        assert_eq!(report.bound, 1);
        assert_eq!(router.bindings()[0].pattern, "/api/a/y");
        assert!(report.errors[0].contains("wizards"));
    }
}
