//! Realtime connection manager
//!
//! Server role: one namespace per package on the local transport, bound at
//! most once per package. Every connection accepted on a namespace gets that
//! package's socket definitions and `onConnect` handlers.
//!
//! Client role: one outbound connection per configured peer URL, carrying
//! the socket definitions of every package. Peer lifecycle changes are
//! published as [`RealtimeNotice`]s; reconnecting is the transport's job.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::table::{ConnectTable, SocketTable};
use crate::realtime::chain::bind_definitions;
use crate::realtime::socket::SocketDefinition;
use crate::realtime::transport::{
    package_namespace, Connection, LifecycleListener, PeerConnection, PeerConnector, PeerLifecycle,
    RealtimeServer,
};
use crate::utils::lock_or_recover;

const NOTICE_CAPACITY: usize = 64;

/// Notification about a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeNotice {
    Status(String),
    Error(String),
}

impl RealtimeNotice {
    pub fn message(&self) -> &str {
        match self {
            RealtimeNotice::Status(message) | RealtimeNotice::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RealtimeNotice::Error(_))
    }
}

/// Connection flags of one peer
#[derive(Debug, Default)]
struct PeerFlags {
    connected: AtomicBool,
    closed: AtomicBool,
}

struct PeerState {
    url: String,
    connection: Arc<dyn PeerConnection>,
    flags: Arc<PeerFlags>,
}

/// Binds socket definitions onto server and peer connections
pub struct ConnectionManager {
    sockets: Arc<SocketTable>,
    on_connect: Arc<ConnectTable>,
    bound: Mutex<HashSet<String>>,
    transport: Mutex<Option<Arc<dyn RealtimeServer>>>,
    peers: Mutex<Vec<PeerState>>,
    notices: broadcast::Sender<RealtimeNotice>,
}

impl ConnectionManager {
    pub fn new(sockets: SocketTable, on_connect: ConnectTable) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            sockets: Arc::new(sockets),
            on_connect: Arc::new(on_connect),
            bound: Mutex::new(HashSet::new()),
            transport: Mutex::new(None),
            peers: Mutex::new(Vec::new()),
            notices,
        }
    }

    /// Receive peer status and error notices from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeNotice> {
        self.notices.subscribe()
    }

    /// Local transport, once [`bind_server`](Self::bind_server) has run
    pub fn transport(&self) -> Option<Arc<dyn RealtimeServer>> {
        lock_or_recover(&self.transport).clone()
    }

    pub fn is_bound(&self, package: &str) -> bool {
        lock_or_recover(&self.bound).contains(package)
    }

    /// Register a namespace listener for every package not bound yet
    ///
    /// Returns the number of namespaces bound by this call.
    pub fn bind_server(&self, server: Arc<dyn RealtimeServer>) -> usize {
        *lock_or_recover(&self.transport) = Some(Arc::clone(&server));

        let packages: Vec<String> = self
            .sockets
            .packages()
            .chain(self.on_connect.packages())
            .map(str::to_string)
            .collect();

        let mut count = 0;
        for package in packages {
            if !lock_or_recover(&self.bound).insert(package.clone()) {
                continue;
            }

            let namespace = package_namespace(&package);
            let sockets = Arc::clone(&self.sockets);
            let on_connect = Arc::clone(&self.on_connect);
            let weak: Weak<dyn RealtimeServer> = Arc::downgrade(&server);
            let owner = package.clone();

            server.on_connection(
                &namespace,
                Arc::new(move |connection: Arc<dyn Connection>| {
                    let definitions = sockets.get(&owner).unwrap_or_default();
                    bind_definitions(&connection, definitions, weak.upgrade());
                    for handler in on_connect.get(&owner).unwrap_or_default() {
                        handler.on_connect(Arc::clone(&connection));
                    }
                    debug!("Accepted {} on namespace of {}", connection.id(), owner);
                }),
            );
            debug!("Bound namespace {}", namespace);
            count += 1;
        }

        info!("Bound {} realtime namespace(s)", count);
        count
    }

    /// Open a client connection to every peer URL
    ///
    /// The socket definitions of all packages are bound onto each
    /// connection. A URL the connector rejects is published as an error
    /// notice. Returns the number of connections opened.
    pub fn connect_peers(&self, connector: &dyn PeerConnector, urls: &[String]) -> usize {
        let definitions: Vec<Arc<SocketDefinition>> = self
            .sockets
            .iter()
            .flat_map(|(_, definitions)| definitions.iter().cloned())
            .collect();
        let transport = self.transport();

        let mut opened = 0;
        for url in urls {
            let peer = match connector.connect(url) {
                Ok(peer) => peer,
                Err(e) => {
                    self.publish(RealtimeNotice::Error(format!(
                        "Socket failed to connect to: {}. Error description: {}",
                        url, e
                    )));
                    continue;
                }
            };

            let flags = Arc::new(PeerFlags::default());
            peer.on_lifecycle(self.lifecycle_listener(url, Arc::clone(&flags)));

            let connection = Arc::clone(&peer).as_connection();
            bind_definitions(&connection, &definitions, transport.clone());

            lock_or_recover(&self.peers).push(PeerState {
                url: url.clone(),
                connection: peer,
                flags,
            });
            debug!("Opened peer connection to {}", url);
            opened += 1;
        }
        opened
    }

    fn lifecycle_listener(
        &self,
        url: &str,
        flags: Arc<PeerFlags>,
    ) -> LifecycleListener {
        let notices = self.notices.clone();
        let url = url.to_string();

        Arc::new(move |event: PeerLifecycle| {
            let notice = match &event {
                PeerLifecycle::Connect => {
                    if !flags.closed.load(Ordering::SeqCst) {
                        flags.connected.store(true, Ordering::SeqCst);
                    }
                    RealtimeNotice::Status(format!("Socket connected to: {}", url))
                }
                PeerLifecycle::Error(e) => {
                    RealtimeNotice::Error(format!("Socket connection {} error: {}", url, e))
                }
                PeerLifecycle::ConnectError(e) => {
                    flags.connected.store(false, Ordering::SeqCst);
                    RealtimeNotice::Error(format!(
                        "Socket failed to connect to: {}. Error description: {}",
                        url, e
                    ))
                }
                PeerLifecycle::Disconnect(_) => {
                    flags.connected.store(false, Ordering::SeqCst);
                    RealtimeNotice::Status(format!("Disconnected socket connection: {}", url))
                }
                PeerLifecycle::Reconnect(_) => {
                    if !flags.closed.load(Ordering::SeqCst) {
                        flags.connected.store(true, Ordering::SeqCst);
                    }
                    RealtimeNotice::Status(format!("Reconnected socket connection: {}", url))
                }
            };
            emit_notice(&notices, notice);
        })
    }

    fn publish(&self, notice: RealtimeNotice) {
        emit_notice(&self.notices, notice);
    }

    /// URLs of peers currently connected
    pub fn connected_peers(&self) -> Vec<String> {
        lock_or_recover(&self.peers)
            .iter()
            .filter(|p| {
                p.flags.connected.load(Ordering::SeqCst) && !p.flags.closed.load(Ordering::SeqCst)
            })
            .map(|p| p.url.clone())
            .collect()
    }

    /// Number of peer connections opened and not torn down
    pub fn peer_count(&self) -> usize {
        lock_or_recover(&self.peers)
            .iter()
            .filter(|p| !p.flags.closed.load(Ordering::SeqCst))
            .count()
    }

    /// Close every peer connection; returns how many were open
    ///
    /// Peers are marked closed before the transport is asked to close them,
    /// so none is reported as connected afterwards.
    pub fn disconnect_all(&self) -> usize {
        let peers: Vec<PeerState> = lock_or_recover(&self.peers).drain(..).collect();
        let mut closed = 0;
        for peer in peers {
            if peer.flags.closed.swap(true, Ordering::SeqCst) {
                continue;
            }
            peer.flags.connected.store(false, Ordering::SeqCst);
            peer.connection.close();
            closed += 1;
        }
        if closed > 0 {
            info!("Closed {} peer connection(s)", closed);
        }
        closed
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

fn emit_notice(notices: &broadcast::Sender<RealtimeNotice>, notice: RealtimeNotice) {
    match &notice {
        RealtimeNotice::Status(message) => info!("{}", message),
        RealtimeNotice::Error(message) => warn!("{}", message),
    }
    // Nobody listening is fine; the notice is already logged
    let _ = notices.send(notice);
}
