//! Socket event definitions

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::package::handlers::HandlerRegistry;
use crate::package::traits::DiscoveryError;
use crate::package::validation::{middleware_field, mode_field, validate_socket, DefinitionValidator};
use crate::realtime::event::{EventHandler, EventMiddleware};

/// How an event's arguments are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketMode {
    /// JSON message plus optional ack
    #[default]
    Message,
    /// Stream, optional JSON message, optional ack
    Stream,
}

impl SocketMode {
    fn parse(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("stream") => SocketMode::Stream,
            _ => SocketMode::Message,
        }
    }
}

/// A validated realtime event binding
#[derive(Clone)]
pub struct SocketDefinition {
    pub event: String,
    pub on_event: Arc<dyn EventHandler>,
    /// Runs in order before `on_event`; may be empty
    pub middleware: Vec<Arc<dyn EventMiddleware>>,
    pub mode: SocketMode,
}

impl fmt::Debug for SocketDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketDefinition")
            .field("event", &self.event)
            .field("middleware", &self.middleware.len())
            .field("mode", &self.mode)
            .finish()
    }
}

impl SocketDefinition {
    pub fn new(event: impl Into<String>, on_event: Arc<dyn EventHandler>) -> Self {
        Self {
            event: event.into(),
            on_event,
            middleware: Vec::new(),
            mode: SocketMode::Message,
        }
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn EventMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.mode = SocketMode::Stream;
        self
    }

    /// Validate and resolve a raw definition for `package`
    pub fn from_raw(
        package: &str,
        raw: &Value,
        registry: &HandlerRegistry,
    ) -> Result<Self, DiscoveryError> {
        let check = validate_socket(raw, package);
        if !check.is_valid {
            return Err(DiscoveryError::InvalidSocket(check.message));
        }

        let mut unknown = Vec::new();
        let handler_name = raw.get("onEvent").and_then(Value::as_str).unwrap_or_default();
        let on_event = registry.event_handler(handler_name);
        if on_event.is_none() {
            unknown.push(format!("onEvent references unknown handler \"{}\"", handler_name));
        }

        // A single name is a one-element chain
        let names: Vec<&str> = match middleware_field(raw) {
            Some(Value::String(name)) => vec![name.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        let mut middleware = Vec::with_capacity(names.len());
        for name in names {
            match registry.event_middleware(name) {
                Some(m) => middleware.push(m),
                None => unknown.push(format!(
                    "middlewareChain references unknown handler \"{}\"",
                    name
                )),
            }
        }

        match on_event {
            Some(on_event) if unknown.is_empty() => Ok(Self {
                event: raw
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                on_event,
                middleware,
                mode: SocketMode::parse(mode_field(raw)),
            }),
            _ => Err(DiscoveryError::InvalidSocket(DefinitionValidator::message(
                "socket", raw, package, &unknown,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::event::{event_handler_fn, event_middleware_fn};
    use serde_json::json;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_event_handler("echo", event_handler_fn(|_, _| {}))
            .register_event_middleware("pass", event_middleware_fn(|_| Ok(())));
        registry
    }

    #[test]
    fn test_single_middleware_becomes_list() {
        let raw = json!({"event": "chat", "onEvent": "echo", "middleware": "pass"});
        let socket = SocketDefinition::from_raw("p", &raw, &registry()).unwrap();
        assert_eq!(socket.middleware.len(), 1);
        assert_eq!(socket.mode, SocketMode::Message);
    }

    #[test]
    fn test_stream_mode() {
        let raw = json!({"event": "upload", "onEvent": "echo", "type": "stream"});
        let socket = SocketDefinition::from_raw("p", &raw, &registry()).unwrap();
        assert_eq!(socket.mode, SocketMode::Stream);
        assert!(socket.middleware.is_empty());
    }

    #[test]
    fn test_unknown_handlers_are_reported() {
        let raw = json!({"event": "chat", "onEvent": "nobody", "middlewareChain": ["pass", "ghost"]});
        let err = SocketDefinition::from_raw("p", &raw, &registry()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"nobody\""));
        assert!(message.contains("\"ghost\""));
        assert!(message.starts_with("Invalid socket"));
    }
}
