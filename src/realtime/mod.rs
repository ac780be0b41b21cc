//! Realtime events
//!
//! Socket definitions, the event chain that runs them, transport contracts
//! with an in-memory implementation, and the connection manager that binds
//! definitions onto server namespaces and peer connections.

pub mod chain;
pub mod event;
pub mod manager;
pub mod memory;
pub mod socket;
pub mod transport;

pub use chain::{bind_definitions, dispatch_event};
pub use event::{
    event_handler_fn, event_middleware_fn, Ack, ConnectHandler, EventContext, EventError,
    EventHandler, EventMiddleware, InboundEvent, Payload, StreamHandle,
};
pub use manager::{ConnectionManager, RealtimeNotice};
pub use memory::{Emitted, MemoryClient, MemoryConnector, MemoryPeer, MemoryServer};
pub use socket::{SocketDefinition, SocketMode};
pub use transport::{
    package_namespace, Connection, PeerConnection, PeerConnector, PeerLifecycle, RealtimeError,
    RealtimeServer,
};
