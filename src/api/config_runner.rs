//! Configuration callbacks
//!
//! Packages export config callbacks by name. They run once, in discovery
//! order, after discovery and before route registration, so every route a
//! callback adds still passes through the registrar and gets its
//! authorization gate. A callback either finishes in place or hands back a
//! pending future, which is awaited before the next callback runs.

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::route::RouteDefinition;
use crate::api::table::{ManifestSet, RouteTable, SocketTable};
use crate::package::handlers::HandlerRegistry;
use crate::package::policy::ErrorPolicy;
use crate::package::registry::discovery::{ConfigEntry, DiscoveredPackages};
use crate::package::traits::DiscoveryError;
use crate::realtime::socket::SocketDefinition;
use crate::realtime::transport::RealtimeServer;

/// Result of a config callback
pub enum ConfigOutcome {
    /// The callback finished
    Done,
    /// The callback continues asynchronously
    Pending(BoxFuture<'static, Result<(), DiscoveryError>>),
}

impl ConfigOutcome {
    pub fn pending<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<(), DiscoveryError>> + Send + 'static,
    {
        ConfigOutcome::Pending(Box::pin(future))
    }
}

impl fmt::Debug for ConfigOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOutcome::Done => f.write_str("Done"),
            ConfigOutcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A package's config callback
pub trait ConfigFn: Send + Sync {
    fn configure(&self, ctx: &mut ConfigContext<'_>) -> Result<ConfigOutcome, DiscoveryError>;
}

struct FnConfig<F>(F);

impl<F> ConfigFn for FnConfig<F>
where
    F: Fn(&mut ConfigContext<'_>) -> Result<ConfigOutcome, DiscoveryError> + Send + Sync,
{
    fn configure(&self, ctx: &mut ConfigContext<'_>) -> Result<ConfigOutcome, DiscoveryError> {
        (self.0)(ctx)
    }
}

/// Wrap a function as a config callback
pub fn config_fn<F>(f: F) -> Arc<dyn ConfigFn>
where
    F: Fn(&mut ConfigContext<'_>) -> Result<ConfigOutcome, DiscoveryError> + Send + Sync + 'static,
{
    Arc::new(FnConfig(f))
}

/// What a config callback can see and change
pub struct ConfigContext<'a> {
    /// Package that exported the callback
    pub package: &'a str,
    /// Mount point of package routes
    pub mount: &'a str,
    /// Composed routes; additions are registered and gated like any other
    pub routes: &'a mut RouteTable,
    /// Composed socket definitions
    pub sockets: &'a mut SocketTable,
    pub manifests: &'a ManifestSet,
    pub registry: &'a HandlerRegistry,
    /// Local realtime transport
    pub transport: Option<Arc<dyn RealtimeServer>>,
    /// Caller-supplied data (the service configuration by default)
    pub data: &'a Value,
}

impl ConfigContext<'_> {
    /// Add a route owned by the calling package, namespaced under it
    pub fn add_route(&mut self, route: RouteDefinition) {
        let route = route.namespaced(self.package);
        debug!("Config callback of {} added route {}", self.package, route.path);
        self.routes.push(self.package, route);
    }

    /// Add a route owned by `owner`, with its path taken as is
    pub fn add_route_for(&mut self, owner: &str, route: RouteDefinition) {
        debug!("Config callback of {} added route {} for {}", self.package, route.path, owner);
        self.routes.push(owner, route);
    }

    /// Add a socket definition to the calling package's namespace
    pub fn add_socket(&mut self, socket: SocketDefinition) {
        self.sockets.push(self.package, Arc::new(socket));
    }
}

/// Shared inputs of a config run
pub struct ConfigEnv<'a> {
    pub mount: &'a str,
    pub registry: &'a HandlerRegistry,
    pub transport: Option<Arc<dyn RealtimeServer>>,
    pub data: &'a Value,
}

/// Run every config callback in order
///
/// A failing callback goes through the error policy: reported and skipped,
/// or raised. Returns the number of callbacks that completed.
pub async fn run_configs(
    entries: &[ConfigEntry],
    discovered: &mut DiscoveredPackages,
    env: &ConfigEnv<'_>,
    policy: &ErrorPolicy,
) -> Result<usize, DiscoveryError> {
    let mut completed = 0;

    for entry in entries {
        let outcome = {
            let mut ctx = ConfigContext {
                package: &entry.package,
                mount: env.mount,
                routes: &mut discovered.routes,
                sockets: &mut discovered.sockets,
                manifests: &discovered.manifests,
                registry: env.registry,
                transport: env.transport.clone(),
                data: env.data,
            };
            entry.callback.configure(&mut ctx)
        };

        let result = match outcome {
            Ok(ConfigOutcome::Done) => Ok(()),
            Ok(ConfigOutcome::Pending(future)) => future.await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                debug!(
                    "Ran config callback of {} from {}",
                    entry.package,
                    entry.source.display()
                );
                completed += 1;
            }
            Err(err) => policy.handle(as_callback_error(&entry.package, err))?,
        }
    }

    info!("Ran {} of {} config callback(s)", completed, entries.len());
    Ok(completed)
}

fn as_callback_error(package: &str, err: DiscoveryError) -> DiscoveryError {
    match err {
        DiscoveryError::ConfigCallback { .. } => err,
        other if other.is_recoverable() => other,
        other => DiscoveryError::ConfigCallback {
            package: package.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::{middleware_fn, Flow};
    use crate::package::policy::CollectingSink;
    use std::path::PathBuf;

    fn entry(package: &str, callback: Arc<dyn ConfigFn>) -> ConfigEntry {
        ConfigEntry {
            package: package.to_string(),
            source: PathBuf::from(format!("{}/api/config.toml", package)),
            callback,
        }
    }

    fn env<'a>(registry: &'a HandlerRegistry, data: &'a Value) -> ConfigEnv<'a> {
        ConfigEnv {
            mount: "/",
            registry,
            transport: None,
            data,
        }
    }

    #[tokio::test]
    async fn test_sync_and_pending_callbacks_run_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);

        let entries = vec![
            entry(
                "a",
                config_fn(move |ctx| {
                    let order = Arc::clone(&first);
                    ctx.add_route(RouteDefinition::new(
                        "added",
                        "GET",
                        vec![middleware_fn(|_| Flow::Continue)],
                    ));
                    Ok(ConfigOutcome::pending(async move {
                        tokio::task::yield_now().await;
                        order.lock().unwrap().push("a");
                        Ok(())
                    }))
                }),
            ),
            entry(
                "b",
                config_fn(move |_| {
                    second.lock().unwrap().push("b");
                    Ok(ConfigOutcome::Done)
                }),
            ),
        ];

        let registry = HandlerRegistry::new();
        let data = Value::Null;
        let mut discovered = DiscoveredPackages::default();
        let done = run_configs(&entries, &mut discovered, &env(&registry, &data), &ErrorPolicy::FailFast)
            .await
            .unwrap();

        assert_eq!(done, 2);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(discovered.routes.get("a").unwrap()[0].path, "/a/added");
    }

    #[tokio::test]
    async fn test_failing_callback_follows_policy() {
        let failing = || {
            config_fn(|_| {
                Ok(ConfigOutcome::pending(async {
                    Err(DiscoveryError::MissingName(PathBuf::from("x")))
                }))
            })
        };
        let registry = HandlerRegistry::new();
        let data = Value::Null;

        let mut discovered = DiscoveredPackages::default();
        let err = run_configs(
            &[entry("a", failing())],
            &mut discovered,
            &env(&registry, &data),
            &ErrorPolicy::FailFast,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::ConfigCallback { .. }));

        let sink = Arc::new(CollectingSink::new());
        let done = run_configs(
            &[entry("a", failing())],
            &mut discovered,
            &env(&registry, &data),
            &ErrorPolicy::Report(sink.clone()),
        )
        .await
        .unwrap();
        assert_eq!(done, 0);
        assert!(sink.messages()[0].contains("package \"a\""));
    }
}
