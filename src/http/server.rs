//! HTTP server
//!
//! Serves a frozen [`RouteMap`] over HTTP/1.1 with hyper. The route map is
//! shared read-only between connections; nothing can be bound once the
//! server is running.

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::identity::{IdentityProvider, AUTH_TOKEN_HEADER};
use crate::http::context::{json_response, RequestContext};
use crate::http::router::RouteMap;

/// HTTP front end for a composed route map
#[derive(Clone)]
pub struct HttpServer {
    routes: Arc<RouteMap>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl HttpServer {
    pub fn new(routes: RouteMap) -> Self {
        Self {
            routes: Arc::new(routes),
            identity: None,
        }
    }

    /// Resolve `auth-token` headers through `provider`
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    /// Authenticate and dispatch one request
    ///
    /// No token means an anonymous caller. A token that does not resolve is
    /// answered with 401 before any route runs.
    pub async fn respond(&self, mut ctx: RequestContext) -> Response<Bytes> {
        if let Some(provider) = &self.identity {
            let token = ctx
                .headers
                .get(AUTH_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Some(token) = token {
                match provider.resolve(&token).await {
                    Ok(identity) => ctx.identity = Some(identity),
                    Err(e) => {
                        warn!("Rejected token for {} {}: {}", ctx.method, ctx.path, e);
                        return json_response(
                            StatusCode::UNAUTHORIZED,
                            &json!({"error": e.to_string()}),
                        );
                    }
                }
            }
        }
        self.routes.dispatch(ctx).await
    }

    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                let response = json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "Failed to read request body"}),
                );
                return response.map(Full::new);
            }
        };

        let mut ctx = RequestContext::new(parts.method, parts.uri.path());
        ctx.query = parts.uri.query().map(str::to_string);
        ctx.headers = parts.headers;
        ctx.body = body;

        self.respond(ctx).await.map(Full::new)
    }

    /// Bind `addr` and serve until [`RunningServer::shutdown`]
    pub async fn start(self, addr: SocketAddr) -> Result<RunningServer> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("HTTP server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let server = self;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("HTTP server on {} shutting down", local_addr);
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!("Failed to accept connection: {}", e);
                                continue;
                            }
                        };
                        let server = server.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |request| {
                                let server = server.clone();
                                async move { Ok::<_, Infallible>(server.handle(request).await) }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("Connection from {} ended with error: {}", peer, e);
                            }
                        });
                    }
                }
            }
        });

        Ok(RunningServer {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a server started with [`HttpServer::start`]
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::{Identity, StaticIdentityProvider};
    use crate::http::context::{middleware_fn, Flow};
    use crate::http::router::{Binding, Router};
    use http::Method;

    fn whoami_server() -> HttpServer {
        let mut routes = RouteMap::new();
        routes.bind(Binding {
            method: Method::GET,
            pattern: "/whoami".into(),
            owner: "test".into(),
            chain: vec![middleware_fn(|ctx| {
                let name = ctx
                    .identity
                    .as_ref()
                    .map(|i| i.username.clone())
                    .unwrap_or_else(|| "anonymous".into());
                Flow::json(StatusCode::OK, &json!({ "user": name }))
            })],
        });
        let provider =
            StaticIdentityProvider::default().with_token("secret", Identity::new("ada", "admin"));
        HttpServer::new(routes).with_identity_provider(Arc::new(provider))
    }

    #[tokio::test]
    async fn test_identity_attached_from_token() {
        let server = whoami_server();

        let response = server.respond(RequestContext::new(Method::GET, "/whoami")).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"], "anonymous");

        let mut ctx = RequestContext::new(Method::GET, "/whoami");
        ctx.headers.insert(AUTH_TOKEN_HEADER, "secret".parse().unwrap());
        let response = server.respond(ctx).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["user"], "ada");
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let server = whoami_server();
        let mut ctx = RequestContext::new(Method::GET, "/whoami");
        ctx.headers.insert(AUTH_TOKEN_HEADER, "forged".parse().unwrap());
        let response = server.respond(ctx).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let running = whoami_server()
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(running.local_addr().port(), 0);
        running.shutdown().await;
    }
}
