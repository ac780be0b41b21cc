//! In-process realtime transport
//!
//! Channel-backed implementations of the transport contracts, used for
//! process-local wiring and tests. [`MemoryServer::connect`] plays the
//! remote client: it opens a connection on a namespace and hands back a
//! [`MemoryClient`] that can send events and read what the server emitted.
//! [`MemoryConnector`] opens [`MemoryPeer`]s whose lifecycle is driven
//! explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::realtime::event::{Ack, InboundEvent, Payload};
use crate::realtime::transport::{
    Connection, ConnectionCallback, EventListener, LifecycleListener, PeerConnection,
    PeerConnector, PeerLifecycle, RealtimeError, RealtimeServer,
};
use crate::utils::lock_or_recover;

/// An event emitted towards the client side
#[derive(Debug, Clone)]
pub struct Emitted {
    pub event: String,
    pub args: Vec<Payload>,
}

/// Server end of an in-memory connection
pub struct MemoryConnection {
    id: String,
    namespace: String,
    listeners: Mutex<HashMap<String, Vec<EventListener>>>,
    outbox: mpsc::UnboundedSender<Emitted>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(namespace: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Emitted>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            namespace: namespace.to_string(),
            listeners: Mutex::new(HashMap::new()),
            outbox,
            closed: AtomicBool::new(false),
        });
        (connection, rx)
    }

    /// Deliver an inbound event to the listeners of `event`
    ///
    /// The ack goes to the first listener only. Returns `false` when nobody
    /// listens for the event.
    pub fn dispatch(&self, event: &str, inbound: InboundEvent) -> bool {
        let listeners = lock_or_recover(&self.listeners)
            .get(event)
            .cloned()
            .unwrap_or_default();
        if listeners.is_empty() {
            debug!("No listener for \"{}\" on {}", event, self.id);
            return false;
        }

        let InboundEvent { args, mut ack } = inbound;
        for listener in listeners {
            listener(InboundEvent {
                args: args.clone(),
                ack: ack.take(),
            });
        }
        true
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock_or_recover(&self.listeners)
            .get(event)
            .map_or(0, Vec::len)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn on(&self, event: &str, listener: EventListener) {
        lock_or_recover(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    fn emit(&self, event: &str, args: Vec<Payload>) -> Result<(), RealtimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::Closed(self.id.clone()));
        }
        self.outbox
            .send(Emitted {
                event: event.to_string(),
                args,
            })
            .map_err(|_| RealtimeError::Closed(self.id.clone()))
    }
}

/// Client end of an in-memory connection
pub struct MemoryClient {
    connection: Arc<MemoryConnection>,
    inbox: mpsc::UnboundedReceiver<Emitted>,
}

impl MemoryClient {
    fn new(connection: Arc<MemoryConnection>, inbox: mpsc::UnboundedReceiver<Emitted>) -> Self {
        Self { connection, inbox }
    }

    /// Send an event without an ack
    pub fn send(&self, event: &str, args: Vec<Payload>) -> bool {
        self.connection.dispatch(event, InboundEvent::new(args))
    }

    /// Send an event with an ack callback
    pub fn send_with_ack(&self, event: &str, args: Vec<Payload>, ack: Ack) -> bool {
        self.connection
            .dispatch(event, InboundEvent::new(args).with_ack(ack))
    }

    /// Next event emitted by the server side
    pub async fn recv(&mut self) -> Option<Emitted> {
        self.inbox.recv().await
    }

    pub fn connection(&self) -> &Arc<MemoryConnection> {
        &self.connection
    }
}

/// In-memory local server
#[derive(Default)]
pub struct MemoryServer {
    namespaces: Mutex<HashMap<String, Vec<ConnectionCallback>>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespaces with at least one listener
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_or_recover(&self.namespaces).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn listener_count(&self, namespace: &str) -> usize {
        lock_or_recover(&self.namespaces)
            .get(namespace)
            .map_or(0, Vec::len)
    }

    /// Open a client connection on `namespace`
    pub fn connect(&self, namespace: &str) -> Result<MemoryClient, RealtimeError> {
        let callbacks = lock_or_recover(&self.namespaces)
            .get(namespace)
            .cloned()
            .ok_or_else(|| RealtimeError::UnknownNamespace(namespace.to_string()))?;

        let (connection, inbox) = MemoryConnection::new(namespace);
        let shared: Arc<dyn Connection> = connection.clone();
        for callback in callbacks {
            callback(Arc::clone(&shared));
        }
        debug!("Accepted connection {} on {}", connection.id, namespace);
        Ok(MemoryClient::new(connection, inbox))
    }
}

impl RealtimeServer for MemoryServer {
    fn on_connection(&self, namespace: &str, callback: ConnectionCallback) {
        lock_or_recover(&self.namespaces)
            .entry(namespace.to_string())
            .or_default()
            .push(callback);
    }
}

/// In-memory outbound peer connection
pub struct MemoryPeer {
    url: String,
    connection: Arc<MemoryConnection>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Emitted>>>,
    lifecycle: Mutex<Vec<LifecycleListener>>,
    closed: AtomicBool,
}

impl MemoryPeer {
    fn new(url: &str) -> Arc<Self> {
        let (connection, inbox) = MemoryConnection::new("/");
        Arc::new(Self {
            url: url.to_string(),
            connection,
            inbox: Mutex::new(Some(inbox)),
            lifecycle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Report a lifecycle change to every listener
    pub fn trigger(&self, event: PeerLifecycle) {
        let listeners = lock_or_recover(&self.lifecycle).clone();
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Deliver an event as if the remote side sent it
    pub fn receive(&self, event: &str, inbound: InboundEvent) -> bool {
        self.connection.dispatch(event, inbound)
    }

    /// Take the receiver of events emitted towards the remote side
    pub fn take_outbox(&self) -> Option<mpsc::UnboundedReceiver<Emitted>> {
        lock_or_recover(&self.inbox).take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.connection.listener_count(event)
    }
}

impl Connection for MemoryPeer {
    fn id(&self) -> &str {
        self.connection.id()
    }

    fn namespace(&self) -> &str {
        self.connection.namespace()
    }

    fn on(&self, event: &str, listener: EventListener) {
        self.connection.on(event, listener)
    }

    fn emit(&self, event: &str, args: Vec<Payload>) -> Result<(), RealtimeError> {
        self.connection.emit(event, args)
    }
}

impl PeerConnection for MemoryPeer {
    fn url(&self) -> &str {
        &self.url
    }

    fn on_lifecycle(&self, listener: LifecycleListener) {
        lock_or_recover(&self.lifecycle).push(listener);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connection.close();
        self.trigger(PeerLifecycle::Disconnect("io client disconnect".to_string()));
    }

    fn as_connection(self: Arc<Self>) -> Arc<dyn Connection> {
        self
    }
}

/// Opens [`MemoryPeer`]s and keeps them reachable for test drivers
#[derive(Default)]
pub struct MemoryConnector {
    peers: Mutex<Vec<Arc<MemoryPeer>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent peer opened for `url`
    pub fn peer(&self, url: &str) -> Option<Arc<MemoryPeer>> {
        lock_or_recover(&self.peers)
            .iter()
            .rev()
            .find(|p| p.url == url)
            .cloned()
    }

    pub fn peers(&self) -> Vec<Arc<MemoryPeer>> {
        lock_or_recover(&self.peers).clone()
    }
}

impl PeerConnector for MemoryConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn PeerConnection>, RealtimeError> {
        if url.trim().is_empty() {
            return Err(RealtimeError::InvalidUrl(url.to_string()));
        }
        let peer = MemoryPeer::new(url);
        lock_or_recover(&self.peers).push(Arc::clone(&peer));
        Ok(peer)
    }
}
