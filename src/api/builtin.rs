//! Standard contributions
//!
//! Version, endpoint listing and status routes every service exposes. They
//! are installed by an ordinary config callback, so they are registered and
//! gated like any package route.

use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::config_runner::{ConfigContext, ConfigFn, ConfigOutcome};
use crate::api::route::{mount_path, RouteDefinition, RouteSummary};
use crate::api::table::ManifestSet;
use crate::http::context::{html_response, json_response, middleware_fn, Flow};
use crate::package::traits::DiscoveryError;
use crate::utils::{current_timestamp_millis, with_default};

/// Package that owns the service-wide routes
pub const SERVICES_PACKAGE: &str = "services";

/// Environment variable holding the build version
pub const BUILD_VERSION_VAR: &str = "BUILD_VERSION";

/// Version entry of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub api: String,
    #[serde(rename = "apiDetails")]
    pub api_details: ApiDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiDetails {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Version entries for every composed package, in discovery order
pub fn package_versions(manifests: &ManifestSet) -> Vec<PackageVersion> {
    manifests
        .iter()
        .map(|(key, manifest)| PackageVersion {
            api: key.to_string(),
            api_details: ApiDetails {
                name: manifest.name.clone(),
                version: manifest.version.clone(),
                description: manifest.description.clone(),
            },
        })
        .collect()
}

/// Render a package's routes as an HTML table
pub fn endpoint_table(routes: &[RouteSummary]) -> String {
    let mut table = String::from(
        "<table border='2' cellpadding='20'><thead><tr><td>#</td><td>HTTP Method</td><td>Path</td></tr></thead><tbody>",
    );
    for (index, route) in routes.iter().enumerate() {
        table.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            index,
            escape_html(&route.http_method),
            escape_html(&route.path)
        ));
    }
    table.push_str("</tbody></table>");
    table
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Config callback installing the standard routes
#[derive(Debug, Clone)]
pub struct StandardRoutes {
    started_at: u64,
}

impl StandardRoutes {
    pub fn new() -> Self {
        Self {
            started_at: current_timestamp_millis(),
        }
    }

    pub fn into_config(self) -> Arc<dyn ConfigFn> {
        Arc::new(self)
    }

    fn version_routes(&self, ctx: &mut ConfigContext<'_>) {
        let versions = package_versions(ctx.manifests);

        for version in &versions {
            let body = json!(version);
            let path = format!("/{}/version", version.api);
            ctx.add_route_for(
                &version.api,
                RouteDefinition::new(
                    path,
                    Method::GET.as_str(),
                    vec![middleware_fn(move |_| Flow::json(StatusCode::OK, &body))],
                ),
            );
        }

        let build_version = with_default(
            || std::env::var(BUILD_VERSION_VAR),
            "unknown".to_string(),
            "Build version not set",
        );
        let all = json!({"buildVersion": build_version, "versions": versions});
        ctx.add_route_for(
            SERVICES_PACKAGE,
            RouteDefinition::new(
                format!("/{}/versions", SERVICES_PACKAGE),
                Method::GET.as_str(),
                vec![middleware_fn(move |_| Flow::json(StatusCode::OK, &all))],
            ),
        );

        ctx.add_route_for(
            SERVICES_PACKAGE,
            RouteDefinition::new(
                format!("/{}/:name/version", SERVICES_PACKAGE),
                Method::GET.as_str(),
                vec![middleware_fn(move |req| {
                    let found = req
                        .param("name")
                        .and_then(|name| versions.iter().find(|v| v.api == name));
                    match found {
                        Some(version) => Flow::json(StatusCode::OK, &json!({"version": version})),
                        None => Flow::status(StatusCode::NOT_FOUND),
                    }
                })],
            ),
        );
    }

    fn endpoint_routes(&self, ctx: &mut ConfigContext<'_>) {
        let mount = ctx.mount.to_string();
        let listings: Vec<(String, Vec<RouteSummary>)> = ctx
            .routes
            .iter()
            .filter(|(_, routes)| !routes.is_empty())
            .map(|(package, routes)| {
                let summaries = routes
                    .iter()
                    .flat_map(|route| route.summaries())
                    .map(|mut summary| {
                        summary.path = mount_path(&mount, &summary.path);
                        summary
                    })
                    .collect();
                (package.to_string(), summaries)
            })
            .collect();

        for (package, summaries) in listings {
            let html = endpoint_table(&summaries);
            let listing = json!(summaries);
            let path = format!("/{}/endpoints", package);

            ctx.add_route_for(
                &package,
                RouteDefinition::new(
                    path.clone(),
                    Method::GET.as_str(),
                    vec![middleware_fn(move |_| {
                        Flow::Respond(html_response(StatusCode::OK, html.clone()))
                    })],
                ),
            );
            ctx.add_route_for(
                &package,
                RouteDefinition::new(
                    path,
                    Method::POST.as_str(),
                    vec![middleware_fn(move |_| {
                        Flow::Respond(json_response(StatusCode::OK, &listing))
                    })],
                ),
            );
        }
    }

    fn status_route(&self, ctx: &mut ConfigContext<'_>) {
        let started = self.started_at;
        ctx.add_route_for(
            SERVICES_PACKAGE,
            RouteDefinition::new(
                "/",
                Method::GET.as_str(),
                vec![middleware_fn(move |_| {
                    Flow::json(StatusCode::OK, &status_body(started, current_timestamp_millis()))
                })],
            ),
        );
    }
}

impl Default for StandardRoutes {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFn for StandardRoutes {
    fn configure(&self, ctx: &mut ConfigContext<'_>) -> Result<ConfigOutcome, DiscoveryError> {
        self.endpoint_routes(ctx);
        self.version_routes(ctx);
        self.status_route(ctx);
        Ok(ConfigOutcome::Done)
    }
}

/// `{started, uptime}` with uptime in seconds
pub fn status_body(started_millis: u64, now_millis: u64) -> Value {
    let uptime = now_millis.saturating_sub(started_millis) as f64 / 1000.0;
    json!({"started": started_millis, "uptime": uptime})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::registry::manifest::PackageManifest;

    #[test]
    fn test_package_versions_follow_manifest_order() {
        let mut manifests = ManifestSet::new();
        let mut a = PackageManifest::new("Alpha");
        a.version = Some("1.2.0".into());
        manifests.insert("alpha", a);
        manifests.insert("beta", PackageManifest::new("beta"));

        let versions = package_versions(&manifests);
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].api, "alpha");
        assert_eq!(versions[0].api_details.name, "Alpha");
        let value = json!(versions[0]);
        assert_eq!(value["apiDetails"]["version"], "1.2.0");
    }

    #[test]
    fn test_endpoint_table_lists_routes() {
        let html = endpoint_table(&[RouteSummary {
            path: "/a/x".into(),
            http_method: "GET".into(),
            access_level: "public".into(),
        }]);
        assert!(html.starts_with("<table"));
        assert!(html.contains("<td>0</td><td>GET</td><td>/a/x</td>"));
    }

    #[test]
    fn test_endpoint_table_escapes_markup() {
        let html = endpoint_table(&[RouteSummary {
            path: "/a/<script>&x".into(),
            http_method: "GET".into(),
            access_level: "public".into(),
        }]);
        assert!(html.contains("<td>/a/&lt;script&gt;&amp;x</td>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_status_body() {
        let body = status_body(1_000, 3_500);
        assert_eq!(body["started"], 1_000);
        assert_eq!(body["uptime"], 2.5);
    }
}
