#![allow(dead_code)]

use bytes::Bytes;
use http::{Method, Response, StatusCode};
use package_services::http::context::{middleware_fn, Flow, Handler, RequestContext};
use package_services::http::router::RouteMap;
use package_services::HandlerRegistry;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Package tree in a temporary directory
///
/// Dependencies are installed hoisted under `<root>/node_modules`.
pub struct PackageTree {
    pub temp_dir: TempDir,
}

impl PackageTree {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("app")
    }

    /// Write the root package manifest
    pub fn root_package(&self, name: &str, dependencies: &[&str]) -> PathBuf {
        let dir = self.root();
        write_manifest(&dir, name, dependencies);
        dir
    }

    /// Write a hoisted dependency's manifest
    pub fn dependency(&self, name: &str, dependencies: &[&str]) -> PathBuf {
        let dir = self.root().join("node_modules").join(name);
        write_manifest(&dir, name, dependencies);
        dir
    }

    /// A package directory outside the root's graph
    pub fn standalone(&self, dir_name: &str, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join(dir_name);
        write_manifest(&dir, name, &[]);
        dir
    }
}

pub fn write_manifest(dir: &Path, name: &str, dependencies: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    let deps: serde_json::Map<String, Value> = dependencies
        .iter()
        .map(|d| (d.to_string(), json!("*")))
        .collect();
    let manifest = json!({"name": name, "version": "1.0.0", "dependencies": deps});
    fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
}

/// Write `api/<file>` into a package
pub fn write_module(package_dir: &Path, file: &str, contents: &str) {
    let api = package_dir.join("api");
    fs::create_dir_all(&api).unwrap();
    fs::write(api.join(file), contents).unwrap();
}

/// Module declaring one GET route handled by `handler`
pub fn route_module(path: &str, handler: &str) -> String {
    format!(
        "[[routes]]\npath = \"{}\"\nhttpMethod = \"GET\"\nmiddlewareChain = [\"{}\"]\n",
        path, handler
    )
}

/// Middleware answering `{"handled_by": label}`
pub fn labelled(label: &'static str) -> Handler {
    middleware_fn(move |_| Flow::json(StatusCode::OK, &json!({ "handled_by": label })))
}

/// Registry with handlers `h`, `alpha` and `beta`
pub fn test_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_middleware("h", labelled("h"))
        .register_middleware("alpha", labelled("alpha"))
        .register_middleware("beta", labelled("beta"));
    registry
}

pub async fn request(routes: &RouteMap, method: Method, path: &str) -> Response<Bytes> {
    routes.dispatch(RequestContext::new(method, path)).await
}

pub fn body_json(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap_or(Value::Null)
}
