//! Realtime event payloads, acknowledgments and handler contracts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::DuplexStream;
use tokio::sync::{oneshot, Mutex, MutexGuard};

use crate::realtime::socket::SocketDefinition;
use crate::realtime::transport::{Connection, RealtimeServer};

/// Error delivered to an acknowledgment or emitted as an `error` event
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error} (code {code})")]
pub struct EventError {
    pub error: String,
    pub code: u16,
}

impl EventError {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    /// A stream-mode event received something other than a stream
    pub fn invalid_stream(event: &str) -> Self {
        Self::new(
            format!(
                "Invalid stream passed to \"{}\". It must be a readable/writable stream.",
                event
            ),
            400,
        )
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({"error": self.error, "code": self.code})
    }
}

/// Bidirectional byte stream attached to an event
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<Mutex<DuplexStream>>,
}

impl StreamHandle {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// Create a connected pair: the handle to send, and the far end
    pub fn pair(max_buf_size: usize) -> (Self, DuplexStream) {
        let (near, far) = tokio::io::duplex(max_buf_size);
        (Self::new(near), far)
    }

    /// Exclusive access for reading or writing
    pub async fn lock(&self) -> MutexGuard<'_, DuplexStream> {
        self.inner.lock().await
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamHandle(..)")
    }
}

/// One argument of an inbound or outbound event
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Stream(StreamHandle),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Stream(_) => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamHandle> {
        match self {
            Payload::Stream(stream) => Some(stream),
            Payload::Json(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Acknowledgment callback, following the `(error, result)` convention
pub struct Ack(Box<dyn FnOnce(Result<Value, EventError>) + Send>);

impl Ack {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<Value, EventError>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Ack whose outcome is delivered to the returned receiver
    pub fn channel() -> (Self, oneshot::Receiver<Result<Value, EventError>>) {
        let (tx, rx) = oneshot::channel();
        let ack = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (ack, rx)
    }

    pub fn send(self, result: Result<Value, EventError>) {
        (self.0)(result)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ack(..)")
    }
}

/// An event as delivered by a connection
#[derive(Debug, Default)]
pub struct InboundEvent {
    pub args: Vec<Payload>,
    pub ack: Option<Ack>,
}

impl InboundEvent {
    pub fn new(args: Vec<Payload>) -> Self {
        Self { args, ack: None }
    }

    pub fn with_ack(mut self, ack: Ack) -> Self {
        self.ack = Some(ack);
        self
    }
}

/// Everything an event handler or middleware sees
#[derive(Clone)]
pub struct EventContext {
    /// Connection the event arrived on
    pub connection: Arc<dyn Connection>,
    /// First JSON argument (for stream events, the one after the stream)
    pub message: Option<Value>,
    /// Stream argument of a stream-mode event
    pub stream: Option<StreamHandle>,
    /// Local transport, absent on peer connections opened without one
    pub transport: Option<Arc<dyn RealtimeServer>>,
    pub definition: Arc<SocketDefinition>,
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("connection", &self.connection.id())
            .field("event", &self.definition.event)
            .field("message", &self.message)
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

/// Final handler of an event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, ctx: &EventContext, ack: Option<Ack>);
}

/// Link of an event's middleware chain; an error short-circuits to the ack
#[async_trait]
pub trait EventMiddleware: Send + Sync {
    async fn handle(&self, ctx: &EventContext) -> Result<(), EventError>;
}

/// Invoked once per accepted connection on a package's namespace
pub trait ConnectHandler: Send + Sync {
    fn on_connect(&self, connection: Arc<dyn Connection>);
}

struct FnEventHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&EventContext, Option<Ack>) + Send + Sync,
{
    async fn on_event(&self, ctx: &EventContext, ack: Option<Ack>) {
        (self.0)(ctx, ack)
    }
}

/// Wrap a synchronous function as an event handler
pub fn event_handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&EventContext, Option<Ack>) + Send + Sync + 'static,
{
    Arc::new(FnEventHandler(f))
}

struct FnEventMiddleware<F>(F);

#[async_trait]
impl<F> EventMiddleware for FnEventMiddleware<F>
where
    F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, ctx: &EventContext) -> Result<(), EventError> {
        (self.0)(ctx)
    }
}

/// Wrap a synchronous function as event middleware
pub fn event_middleware_fn<F>(f: F) -> Arc<dyn EventMiddleware>
where
    F: Fn(&EventContext) -> Result<(), EventError> + Send + Sync + 'static,
{
    Arc::new(FnEventMiddleware(f))
}

impl<F> ConnectHandler for F
where
    F: Fn(Arc<dyn Connection>) + Send + Sync,
{
    fn on_connect(&self, connection: Arc<dyn Connection>) {
        self(connection)
    }
}
