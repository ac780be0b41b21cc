//! Service orchestration
//!
//! [`Services`] is the composition root: it owns the discovery context,
//! composes packages into a route map and realtime bindings, and runs the
//! HTTP server. Composition order is fixed: discovery, config callbacks,
//! route registration, realtime binding.

use anyhow::Result;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::builtin::{StandardRoutes, SERVICES_PACKAGE};
use crate::api::config_runner::{run_configs, ConfigEnv, ConfigFn};
use crate::api::registrar::{register, RegistrationReport};
use crate::api::table::ManifestSet;
use crate::auth::identity::{IdentityProvider, StaticIdentityProvider};
use crate::auth::roles::AccessControl;
use crate::config::ServiceConfig;
use crate::http::router::RouteMap;
use crate::http::server::{HttpServer, RunningServer};
use crate::package::context::DiscoveryContext;
use crate::package::handlers::HandlerRegistry;
use crate::package::policy::{ErrorPolicy, ErrorSink};
use crate::package::registry::discovery::{ConfigEntry, PackageDiscovery};
use crate::package::traits::DiscoveryError;
use crate::realtime::manager::ConnectionManager;
use crate::realtime::memory::MemoryServer;
use crate::realtime::transport::{PeerConnector, RealtimeServer};
use crate::utils::{init_logging_from_config, result_to_option, wait_for_shutdown_signal};

/// Result of composing every discovered package
pub struct Composition {
    pub routes: RouteMap,
    pub registration: RegistrationReport,
    pub manifests: ManifestSet,
    pub realtime: Arc<ConnectionManager>,
}

/// Package services composition root
pub struct Services {
    config: ServiceConfig,
    context: DiscoveryContext,
    access: Arc<AccessControl>,
    configs: Vec<ConfigEntry>,
    realtime: Arc<dyn RealtimeServer>,
    connector: Option<Arc<dyn PeerConnector>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    started: bool,
}

impl Services {
    /// Create services from a validated configuration and handler registry
    pub fn new(config: ServiceConfig, registry: HandlerRegistry) -> Result<Self> {
        config.validate()?;
        let access = config.access_control()?;
        let context = DiscoveryContext::new(registry, config.error_policy.to_policy())
            .with_walker(config.walker());
        let identity = Self::identity_from_config(&config);

        info!(
            "Initialized services: main={:?}, {} extra director(ies), policy={:?}",
            config.main,
            config.directories.len(),
            context.policy
        );

        Ok(Self {
            config,
            context,
            access,
            configs: Vec::new(),
            realtime: Arc::new(MemoryServer::new()),
            connector: None,
            identity,
            started: false,
        })
    }

    fn identity_from_config(config: &ServiceConfig) -> Option<Arc<dyn IdentityProvider>> {
        #[cfg(feature = "remote-auth")]
        if let Some(url) = &config.auth.auth_url {
            return Some(Arc::new(crate::auth::identity::RemoteIdentityProvider::new(url)));
        }
        #[cfg(not(feature = "remote-auth"))]
        if config.auth.auth_url.is_some() {
            warn!("auth_url is set but the remote-auth feature is disabled; using the token table");
        }

        if config.auth.tokens.is_empty() {
            None
        } else {
            Some(Arc::new(StaticIdentityProvider::new(config.auth.tokens.clone())))
        }
    }

    /// Report recoverable discovery errors to `sink` instead of raising them
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.context.policy = ErrorPolicy::Report(sink);
        self
    }

    pub fn with_realtime_server(mut self, server: Arc<dyn RealtimeServer>) -> Self {
        self.realtime = server;
        self
    }

    /// Transport used to open connections to `socket.connections`
    pub fn with_peer_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub fn service_config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.context
    }

    /// Add a config callback, run after the packages' own callbacks
    pub fn config(&mut self, callback: Arc<dyn ConfigFn>) -> Result<&mut Self, DiscoveryError> {
        if self.started {
            return Err(DiscoveryError::AlreadyStarted);
        }
        self.configs.push(ConfigEntry {
            package: SERVICES_PACKAGE.to_string(),
            source: PathBuf::new(),
            callback,
        });
        Ok(self)
    }

    /// Discover packages and compose their contributions
    pub async fn compose(&self) -> Result<Composition, DiscoveryError> {
        let discovery = PackageDiscovery::new(self.context.clone(), self.config.discovery_options());
        let mut discovered = discovery.discover_all_async().await?;

        let mut entries = std::mem::take(&mut discovered.configs);
        entries.extend(self.configs.iter().cloned());
        entries.push(ConfigEntry {
            package: SERVICES_PACKAGE.to_string(),
            source: PathBuf::new(),
            callback: StandardRoutes::new().into_config(),
        });

        let data = result_to_option(
            serde_json::to_value(&self.config),
            "Failed to serialize service configuration",
        )
        .unwrap_or(Value::Null);
        let env = ConfigEnv {
            mount: &self.config.rest_api_root,
            registry: &self.context.registry,
            transport: Some(Arc::clone(&self.realtime)),
            data: &data,
        };
        run_configs(&entries, &mut discovered, &env, &self.context.policy).await?;

        let mut routes = RouteMap::new();
        let registration = register(
            &discovered.routes,
            &mut routes,
            &self.config.rest_api_root,
            &self.access,
            &self.context.policy,
        )?;

        let manager = Arc::new(ConnectionManager::new(
            std::mem::take(&mut discovered.sockets),
            std::mem::take(&mut discovered.on_connect),
        ));
        manager.bind_server(Arc::clone(&self.realtime));
        if let Some(connector) = &self.connector {
            manager.connect_peers(connector.as_ref(), &self.config.socket.connections);
        } else if !self.config.socket.connections.is_empty() {
            warn!(
                "{} peer connection(s) configured but no peer connector set",
                self.config.socket.connections.len()
            );
        }

        Ok(Composition {
            routes,
            registration,
            manifests: discovered.manifests,
            realtime: manager,
        })
    }

    /// Compose and serve on the configured address
    pub async fn start(&mut self) -> Result<RunningService> {
        let addr = self.config.listen;
        self.start_on(addr).await
    }

    /// Compose and serve on `addr`
    pub async fn start_on(&mut self, addr: SocketAddr) -> Result<RunningService> {
        if self.started {
            return Err(DiscoveryError::AlreadyStarted.into());
        }

        let composition = self.compose().await?;
        let mut server = HttpServer::new(composition.routes);
        if let Some(provider) = &self.identity {
            server = server.with_identity_provider(Arc::clone(provider));
        }

        let running = server.start(addr).await?;
        self.started = true;
        info!("Services started on {}", running.local_addr());

        Ok(RunningService {
            server: running,
            realtime: composition.realtime,
            manifests: composition.manifests,
        })
    }

    /// Start, serve until a shutdown signal, then stop
    pub async fn run(mut self) -> Result<()> {
        init_logging_from_config(Some(&self.config.logging));
        let running = self.start().await?;
        wait_for_shutdown_signal().await;
        running.shutdown().await;
        Ok(())
    }
}

/// A started service
pub struct RunningService {
    server: RunningServer,
    realtime: Arc<ConnectionManager>,
    manifests: ManifestSet,
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn realtime(&self) -> &Arc<ConnectionManager> {
        &self.realtime
    }

    pub fn manifests(&self) -> &ManifestSet {
        &self.manifests
    }

    /// Close peer connections, then stop accepting requests
    pub async fn shutdown(self) {
        self.realtime.disconnect_all();
        self.server.shutdown().await;
        info!("Services stopped");
    }
}
