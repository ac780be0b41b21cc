//! Named handler registry
//!
//! Contribution modules are data files, so every callable they reference is
//! looked up by name here: HTTP middleware, event handlers and middleware,
//! connect handlers, config callbacks, and module factories. The registry is
//! filled before discovery and shared read-only afterwards.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::api::config_runner::ConfigFn;
use crate::http::context::Handler;
use crate::realtime::event::{ConnectHandler, EventHandler, EventMiddleware};

/// Zero-argument producer of a module's exports
pub type ModuleFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Handlers addressable from contribution modules
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    middleware: HashMap<String, Handler>,
    event_handlers: HashMap<String, Arc<dyn EventHandler>>,
    event_middleware: HashMap<String, Arc<dyn EventMiddleware>>,
    connect_handlers: HashMap<String, Arc<dyn ConnectHandler>>,
    config_fns: HashMap<String, Arc<dyn ConfigFn>>,
    factories: HashMap<String, ModuleFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_middleware(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.middleware.insert(name.into(), handler);
        self
    }

    pub fn register_event_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        self.event_handlers.insert(name.into(), handler);
        self
    }

    pub fn register_event_middleware(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn EventMiddleware>,
    ) -> &mut Self {
        self.event_middleware.insert(name.into(), middleware);
        self
    }

    pub fn register_connect_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ConnectHandler>,
    ) -> &mut Self {
        self.connect_handlers.insert(name.into(), handler);
        self
    }

    pub fn register_config(&mut self, name: impl Into<String>, config: Arc<dyn ConfigFn>) -> &mut Self {
        self.config_fns.insert(name.into(), config);
        self
    }

    pub fn register_factory(&mut self, name: impl Into<String>, factory: ModuleFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn middleware(&self, name: &str) -> Option<Handler> {
        self.middleware.get(name).cloned()
    }

    pub fn event_handler(&self, name: &str) -> Option<Arc<dyn EventHandler>> {
        self.event_handlers.get(name).cloned()
    }

    pub fn event_middleware(&self, name: &str) -> Option<Arc<dyn EventMiddleware>> {
        self.event_middleware.get(name).cloned()
    }

    pub fn connect_handler(&self, name: &str) -> Option<Arc<dyn ConnectHandler>> {
        self.connect_handlers.get(name).cloned()
    }

    pub fn config(&self, name: &str) -> Option<Arc<dyn ConfigFn>> {
        self.config_fns.get(name).cloned()
    }

    pub fn factory(&self, name: &str) -> Option<ModuleFactory> {
        self.factories.get(name).cloned()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("middleware", &self.middleware.len())
            .field("event_handlers", &self.event_handlers.len())
            .field("event_middleware", &self.event_middleware.len())
            .field("connect_handlers", &self.connect_handlers.len())
            .field("config_fns", &self.config_fns.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}
