//! Route binding and dispatch
//!
//! [`Router`] is the narrow seam between composition and the HTTP layer:
//! the registrar only asks who owns a `(pattern, method)` pair and binds new
//! ones. [`RouteMap`] is the in-crate implementation: an ordered list of
//! bindings where the first matching pattern wins and a chain that finishes
//! without responding falls through to the next match.

use bytes::Bytes;
use http::{Method, Response, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::http::context::{json_response, run_chain, Handler, RequestContext};

/// A chain bound to a method and path pattern
#[derive(Clone)]
pub struct Binding {
    pub method: Method,
    /// Path pattern; `:name` captures a segment, a trailing `*` the rest
    pub pattern: String,
    /// Package (or built-in) that registered the binding
    pub owner: String,
    pub chain: Vec<Handler>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("owner", &self.owner)
            .field("chain", &self.chain.len())
            .finish()
    }
}

/// Target of route registration
pub trait Router: Send {
    /// Owner of the binding for this pattern and method, if any
    ///
    /// Patterns compare the way requests match them: ASCII case-insensitively.
    fn owner_of(&self, pattern: &str, method: &Method) -> Option<&str>;

    /// Add a binding after all existing ones
    fn bind(&mut self, binding: Binding);
}

/// Ordered route table
#[derive(Debug, Default, Clone)]
pub struct RouteMap {
    bindings: Vec<Binding>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Dispatch a request through the matching chains
    ///
    /// Unmatched requests, and requests whose every matching chain continued
    /// past its last link, get a 404.
    pub async fn dispatch(&self, mut ctx: RequestContext) -> Response<Bytes> {
        for binding in &self.bindings {
            if binding.method != ctx.method {
                continue;
            }
            let Some(params) = match_pattern(&binding.pattern, &ctx.path) else {
                continue;
            };
            ctx.params = params;
            if let Some(response) = run_chain(&binding.chain, &mut ctx).await {
                return response;
            }
        }

        debug!("No route for {} {}", ctx.method, ctx.path);
        json_response(
            StatusCode::NOT_FOUND,
            &json!({"error": format!("Cannot {} {}", ctx.method, ctx.path)}),
        )
    }
}

impl Router for RouteMap {
    fn owner_of(&self, pattern: &str, method: &Method) -> Option<&str> {
        let pattern = trim_path(pattern);
        self.bindings
            .iter()
            .find(|b| &b.method == method && trim_path(&b.pattern).eq_ignore_ascii_case(pattern))
            .map(|b| b.owner.as_str())
    }

    fn bind(&mut self, binding: Binding) {
        debug!(
            "Bound {} {} for {}",
            binding.method, binding.pattern, binding.owner
        );
        self.bindings.push(binding);
    }
}

fn trim_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Match a request path against a pattern, returning captured params
///
/// Literal segments compare ASCII case-insensitively; captured values keep
/// the request's case.
pub fn match_pattern(
    pattern: &str,
    path: &str,
) -> Option<std::collections::HashMap<String, String>> {
    let mut params = std::collections::HashMap::new();
    let mut actual = segments(path);
    let mut expected = segments(pattern).peekable();

    while let Some(part) = expected.next() {
        if part == "*" && expected.peek().is_none() {
            let rest: Vec<&str> = actual.by_ref().collect();
            params.insert("*".to_string(), rest.join("/"));
            return Some(params);
        }
        let value = actual.next()?;
        if let Some(name) = part.strip_prefix(':') {
            params.insert(name.to_string(), value.to_string());
        } else if !part.eq_ignore_ascii_case(value) {
            return None;
        }
    }

    if actual.next().is_some() {
        return None;
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::{middleware_fn, Flow};

    fn responder(body: &'static str) -> Handler {
        middleware_fn(move |_| Flow::json(StatusCode::OK, &json!({ "from": body })))
    }

    fn binding(method: Method, pattern: &str, chain: Vec<Handler>) -> Binding {
        Binding {
            method,
            pattern: pattern.to_string(),
            owner: "test".to_string(),
            chain,
        }
    }

    async fn body_of(response: Response<Bytes>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_pattern_matching() {
        assert!(match_pattern("/a/x", "/a/x").is_some());
        assert!(match_pattern("/a/x", "/a/x/").is_some());
        assert!(match_pattern("/a/x", "/a/y").is_none());
        assert!(match_pattern("/a/x", "/A/x").is_some());
        assert!(match_pattern("/a", "/a/x").is_none());
        assert!(match_pattern("/", "/").is_some());

        let params = match_pattern("/services/:name/version", "/services/auth/version").unwrap();
        assert_eq!(params["name"], "auth");

        let params = match_pattern("/files/*", "/files/a/b/c").unwrap();
        assert_eq!(params["*"], "a/b/c");
        assert!(match_pattern("/files/*", "/files").is_some());
    }

    #[tokio::test]
    async fn test_first_match_wins_and_methods_are_distinct() {
        let mut map = RouteMap::new();
        map.bind(binding(Method::GET, "/a/:id", vec![responder("param")]));
        map.bind(binding(Method::GET, "/a/x", vec![responder("literal")]));

        let response = map.dispatch(RequestContext::new(Method::GET, "/a/x")).await;
        assert_eq!(body_of(response).await["from"], "param");

        let response = map.dispatch(RequestContext::new(Method::POST, "/a/x")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exhausted_chain_falls_through() {
        let mut map = RouteMap::new();
        map.bind(binding(Method::GET, "/a/*", vec![middleware_fn(|_| Flow::Continue)]));
        map.bind(binding(Method::GET, "/a/b", vec![responder("second")]));

        let response = map.dispatch(RequestContext::new(Method::GET, "/a/b")).await;
        assert_eq!(body_of(response).await["from"], "second");
    }

    #[test]
    fn test_owner_lookup_is_exact() {
        let mut map = RouteMap::new();
        let mut b = binding(Method::GET, "/a/x", vec![responder("x")]);
        b.owner = "alpha".to_string();
        map.bind(b);

        assert_eq!(map.owner_of("/a/x", &Method::GET), Some("alpha"));
        assert_eq!(map.owner_of("/a/x/", &Method::GET), Some("alpha"));
        assert_eq!(map.owner_of("/a/x", &Method::POST), None);
        assert_eq!(map.owner_of("/a/:id", &Method::GET), None);
    }
}
