//! UDP server: entry points, rebuilds and publishing.
//!
//! # Data Flow
//! ```text
//! ProxyConfig
//!     → bind one Listener per entry point (failure → logged, skipped)
//!     → one Forwarder per bound entry point, each reading a HandlerSlot
//!
//! Config update (file watcher) or ServerHandle::apply
//!     → merge providers → RuntimeConfiguration::new
//!     → routing Manager::build_handlers (status annotated in the snapshot)
//!     → store each entry point's handler in its slot (atomic swap)
//!     → publish the snapshot (atomic swap)
//! ```
//!
//! # Design Decisions
//! - Rebuilds are serialized and run off the forwarding path
//! - Forwarders never observe a partially built handler set
//! - Entry point changes need a restart; graph changes apply live

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::config::dynamic::UdpConfiguration;
use crate::config::schema::ProxyConfig;
use crate::handler::EntryPointHandler;
use crate::net::{Forwarder, ForwarderSettings, HandlerSlot, Listener};
use crate::observability::metrics;
use crate::routing::Manager;
use crate::runtime::{RuntimeConfiguration, Status};
use crate::service::ServiceManager;

/// Provider name of the graph embedded in the config file.
pub const FILE_PROVIDER: &str = "file";

/// The UDP data plane: bound entry points waiting to run.
#[derive(Debug)]
pub struct UdpServer {
    config: ProxyConfig,
    forwarders: Vec<Forwarder>,
    handle: ServerHandle,
}

/// Cloneable access to a running server's routing state.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entry_points: Vec<String>,
    slots: BTreeMap<String, HandlerSlot>,
    local_addrs: BTreeMap<String, SocketAddr>,
    runtime: ArcSwap<RuntimeConfiguration>,
    manager: Manager,
    rebuild: Mutex<()>,
}

impl UdpServer {
    /// Bind every configured entry point and build the initial handlers.
    ///
    /// An entry point that fails to bind is reported once and left out; the
    /// others still serve.
    pub async fn bind(config: &ProxyConfig) -> Self {
        let mut forwarders = Vec::new();
        let mut slots = BTreeMap::new();
        let mut local_addrs = BTreeMap::new();

        for (name, entry_point) in &config.entry_points {
            let listener = match Listener::bind(name, entry_point).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!(error = %err, "Entry point will not serve traffic");
                    continue;
                }
            };

            let slot: HandlerSlot = Arc::new(ArcSwapOption::empty());
            local_addrs.insert(name.clone(), listener.local_addr());
            slots.insert(name.clone(), Arc::clone(&slot));
            forwarders.push(Forwarder::new(
                listener,
                slot,
                ForwarderSettings::new(entry_point, &config.forwarder),
            ));
        }

        let manager = Manager::new(ServiceManager::new(config.forwarder.dial_timeout()));
        let handle = ServerHandle {
            inner: Arc::new(Inner {
                entry_points: config.entry_point_names(),
                slots,
                local_addrs,
                runtime: ArcSwap::from_pointee(RuntimeConfiguration::default()),
                manager,
                rebuild: Mutex::new(()),
            }),
        };
        handle.apply(config.udp.clone());

        Self {
            config: config.clone(),
            forwarders,
            handle,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Forward traffic and apply config updates until shutdown.
    pub async fn run(
        self,
        mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let Self {
            mut config,
            forwarders,
            handle,
        } = self;

        let mut tasks = JoinSet::new();
        for forwarder in forwarders {
            tracing::debug!(entry_point = forwarder.name(), "Starting forwarder");
            tasks.spawn(forwarder.run(shutdown.resubscribe()));
        }

        let mut watching = true;
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                update = updates.recv(), if watching => match update {
                    Some(next) => {
                        if next.entry_points != config.entry_points || next.forwarder != config.forwarder {
                            tracing::warn!("Entry point or forwarder settings changed, restart to apply them");
                        }
                        if next.udp != config.udp {
                            handle.apply(next.udp.clone());
                        }
                        config = next;
                    }
                    None => watching = false,
                },
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "Forwarder task failed");
            }
        }
        tracing::info!("UDP server stopped");
    }
}

impl ServerHandle {
    /// Rebuild from the file provider's graph.
    pub fn apply(&self, udp: UdpConfiguration) {
        self.apply_providers([(FILE_PROVIDER, udp)]);
    }

    /// Rebuild from the graphs of several providers and publish the result.
    ///
    /// Flows already established keep their backend; only new flows see
    /// the new handlers.
    pub fn apply_providers<I, S>(&self, providers: I)
    where
        I: IntoIterator<Item = (S, UdpConfiguration)>,
        S: AsRef<str>,
    {
        let _rebuild = self.inner.rebuild.lock();

        let mut conf = RuntimeConfiguration::new(UdpConfiguration::merge(providers));
        let mut handlers = self
            .inner
            .manager
            .build_handlers(&mut conf, &self.inner.entry_points);

        for (name, slot) in &self.inner.slots {
            slot.store(handlers.remove(name).map(Arc::new));
        }

        tracing::info!(
            routers = conf.routers.len(),
            enabled = conf.count_routers(Status::Enabled),
            warning = conf.count_routers(Status::Warning),
            error = conf.count_routers(Status::Error),
            disabled = conf.count_routers(Status::Disabled),
            "Applied udp configuration"
        );
        self.inner.runtime.store(Arc::new(conf));
        metrics::record_rebuild();
    }

    /// Latest published runtime configuration.
    pub fn runtime(&self) -> Arc<RuntimeConfiguration> {
        self.inner.runtime.load_full()
    }

    /// Bound address of an entry point, if it is serving.
    pub fn local_addr(&self, entry_point: &str) -> Option<SocketAddr> {
        self.inner.local_addrs.get(entry_point).copied()
    }

    /// Handler currently serving an entry point.
    pub fn handler(&self, entry_point: &str) -> Option<Arc<EntryPointHandler>> {
        self.inner.slots.get(entry_point)?.load_full()
    }
}
