//! Realtime transport contracts
//!
//! The connection manager only needs to register namespace listeners on the
//! local server, attach event listeners to connections, emit events, and
//! observe the lifecycle of outbound peer connections. Reconnection and
//! backoff belong to the transport's client.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::realtime::event::{InboundEvent, Payload};

/// Transport errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("No listener registered for namespace \"{0}\"")]
    UnknownNamespace(String),

    #[error("Connection {0} is closed")]
    Closed(String),

    #[error("Invalid peer URL \"{0}\"")]
    InvalidUrl(String),
}

/// Receives inbound events for one event name
pub type EventListener = Arc<dyn Fn(InboundEvent) + Send + Sync>;

/// Receives every accepted connection of a namespace
pub type ConnectionCallback = Arc<dyn Fn(Arc<dyn Connection>) + Send + Sync>;

/// Receives lifecycle changes of a peer connection
pub type LifecycleListener = Arc<dyn Fn(PeerLifecycle) + Send + Sync>;

/// One bidirectional realtime session
pub trait Connection: Send + Sync {
    fn id(&self) -> &str;

    /// Namespace the connection was accepted on (`/` for peer connections)
    fn namespace(&self) -> &str;

    /// Add a listener for `event`
    fn on(&self, event: &str, listener: EventListener);

    /// Send an event to the other side
    fn emit(&self, event: &str, args: Vec<Payload>) -> Result<(), RealtimeError>;
}

/// Local server side of the transport
pub trait RealtimeServer: Send + Sync {
    /// Invoke `callback` for every connection accepted on `namespace`
    fn on_connection(&self, namespace: &str, callback: ConnectionCallback);
}

/// Lifecycle of an outbound peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerLifecycle {
    Connect,
    Error(String),
    ConnectError(String),
    Disconnect(String),
    Reconnect(u32),
}

impl fmt::Display for PeerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerLifecycle::Connect => f.write_str("connect"),
            PeerLifecycle::Error(_) => f.write_str("error"),
            PeerLifecycle::ConnectError(_) => f.write_str("connect_error"),
            PeerLifecycle::Disconnect(_) => f.write_str("disconnect"),
            PeerLifecycle::Reconnect(_) => f.write_str("reconnect"),
        }
    }
}

/// Outbound client connection to another service instance
pub trait PeerConnection: Send + Sync {
    fn url(&self) -> &str;

    fn on_lifecycle(&self, listener: LifecycleListener);

    /// Tear the connection down; must not block
    fn close(&self);

    /// The same session viewed as a plain connection
    fn as_connection(self: Arc<Self>) -> Arc<dyn Connection>;
}

/// Opens peer connections
///
/// Connecting is lazy: the returned connection reports success or failure
/// through its lifecycle listeners.
pub trait PeerConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Arc<dyn PeerConnection>, RealtimeError>;
}

/// Namespace of a package on the local server
pub fn package_namespace(package: &str) -> String {
    format!("/{}", package.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_names() {
        assert_eq!(PeerLifecycle::ConnectError("x".into()).to_string(), "connect_error");
        assert_eq!(PeerLifecycle::Reconnect(2).to_string(), "reconnect");
    }

    #[test]
    fn test_package_namespace() {
        assert_eq!(package_namespace("storage"), "/storage");
        assert_eq!(package_namespace("/storage"), "/storage");
    }
}
