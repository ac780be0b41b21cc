//! Request context and middleware contract
//!
//! A bound route is an ordered chain of [`Middleware`]. Each link either lets
//! the request continue down the chain or responds, which ends it.

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::identity::Identity;

/// Per-request state shared by a middleware chain
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Values captured by `:name` segments of the matched pattern
    pub params: HashMap<String, String>,
    /// Set before dispatch when the request carried a valid token
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            identity: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Outcome of one middleware
#[derive(Debug)]
pub enum Flow {
    /// Pass the request to the next link
    Continue,
    /// Answer the request; the rest of the chain is skipped
    Respond(Response<Bytes>),
}

impl Flow {
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Flow::Respond(json_response(status, body))
    }

    pub fn status(status: StatusCode) -> Self {
        Flow::Respond(text_response(
            status,
            status.canonical_reason().unwrap_or_default(),
        ))
    }
}

/// One link of a route's chain
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext) -> Flow;
}

/// Shared handle to a middleware
pub type Handler = Arc<dyn Middleware>;

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Flow + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext) -> Flow {
        (self.0)(ctx)
    }
}

/// Wrap a synchronous function as a middleware
pub fn middleware_fn<F>(f: F) -> Handler
where
    F: Fn(&mut RequestContext) -> Flow + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Run a chain in order
///
/// Returns the first response produced, or `None` when every link
/// continued.
pub async fn run_chain(chain: &[Handler], ctx: &mut RequestContext) -> Option<Response<Bytes>> {
    for link in chain {
        if let Flow::Respond(response) = link.handle(ctx).await {
            return Some(response);
        }
    }
    None
}

fn build(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}

/// JSON response with the given status
pub fn json_response(status: StatusCode, body: &Value) -> Response<Bytes> {
    build(
        status,
        "application/json",
        Bytes::from(body.to_string()),
    )
}

/// HTML response with the given status
pub fn html_response(status: StatusCode, body: String) -> Response<Bytes> {
    build(status, "text/html; charset=utf-8", Bytes::from(body))
}

/// Plain-text response with the given status
pub fn text_response(status: StatusCode, body: &str) -> Response<Bytes> {
    build(
        status,
        "text/plain; charset=utf-8",
        Bytes::copy_from_slice(body.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_chain_stops_at_first_response() {
        let chain = vec![
            middleware_fn(|ctx| {
                ctx.params.insert("seen".into(), "1".into());
                Flow::Continue
            }),
            middleware_fn(|_| Flow::json(StatusCode::OK, &json!({"ok": true}))),
            middleware_fn(|_| panic!("must not run")),
        ];
        let mut ctx = RequestContext::new(Method::GET, "/a");
        let response = run_chain(&chain, &mut ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.param("seen"), Some("1"));
    }

    #[tokio::test]
    async fn test_exhausted_chain_yields_none() {
        let chain = vec![middleware_fn(|_| Flow::Continue)];
        let mut ctx = RequestContext::new(Method::GET, "/a");
        assert!(run_chain(&chain, &mut ctx).await.is_none());
    }

    #[test]
    fn test_json_response_sets_content_type() {
        let response = json_response(StatusCode::FORBIDDEN, &json!({"error": "Forbidden"}));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }
}
