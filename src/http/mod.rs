//! HTTP primitive
//!
//! Request context, middleware chains, the route map composition binds into,
//! and the hyper server that serves it.

pub mod context;
pub mod router;
pub mod server;

pub use context::{
    html_response, json_response, middleware_fn, run_chain, text_response, Flow, Handler,
    Middleware, RequestContext,
};
pub use router::{Binding, RouteMap, Router};
pub use server::{HttpServer, RunningServer};
