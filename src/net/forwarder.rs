//! Per-entry-point datagram forwarding.
//!
//! # Data Flow
//! ```text
//! recv_from(client)
//!     → flow table hit   → queue datagram on the flow (full → drop)
//!     → flow table miss  → load current EntryPointHandler (none → drop)
//!                        → insert pending flow, queue datagram
//!                        → spawn flow worker
//!
//! Flow worker:
//!     handler.serve(client) once
//!         → rejected/failed → remove flow, discard queue
//!         → Upstream        → relay queue → backend, backend → client
//!     until idle timeout | backend error | client write error | shutdown
//! ```
//!
//! # Design Decisions
//! - The receive loop is the only writer that creates flows, so creation is
//!   at most once per client address; later datagrams wait in the pending
//!   flow's queue for the handler outcome
//! - The handler is loaded once per flow; a swap only affects new flows
//! - One worker per flow, so a slow backend never blocks other clients

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::config::schema::{EntryPointConfig, ForwarderConfig};
use crate::handler::{EntryPointHandler, Upstream};
use crate::net::flow::{CloseReason, CloseSignal, Flow, FlowReceiver, FlowTable};
use crate::net::listener::Listener;
use crate::observability::metrics;

/// How long shutdown waits for flow workers before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Forwarding limits of one entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderSettings {
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
    pub queue_depth: usize,
    pub max_flows: usize,
    pub max_datagram_size: usize,
}

impl ForwarderSettings {
    pub fn new(entry_point: &EntryPointConfig, forwarder: &ForwarderConfig) -> Self {
        let idle_timeout = entry_point.idle_timeout();
        Self {
            idle_timeout,
            reap_interval: forwarder.reap_interval(idle_timeout),
            queue_depth: forwarder.queue_depth,
            max_flows: forwarder.max_flows,
            max_datagram_size: forwarder.max_datagram_size,
        }
    }
}

/// Slot holding the handler currently serving an entry point.
pub type HandlerSlot = Arc<ArcSwapOption<EntryPointHandler>>;

/// Owns one entry point socket and its flows.
#[derive(Debug)]
pub struct Forwarder {
    name: String,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    handler: HandlerSlot,
    flows: Arc<FlowTable>,
    settings: ForwarderSettings,
}

impl Forwarder {
    pub fn new(listener: Listener, handler: HandlerSlot, settings: ForwarderSettings) -> Self {
        Self {
            name: listener.name().to_string(),
            socket: listener.socket(),
            local_addr: listener.local_addr(),
            handler,
            flows: Arc::new(FlowTable::new(settings.max_flows)),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live flow table, for inspection.
    pub fn flows(&self) -> Arc<FlowTable> {
        Arc::clone(&self.flows)
    }

    /// Receive and dispatch datagrams until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let span = tracing::info_span!("udp_forwarder", entry_point = %self.name);
        async move {
            let (stop_reaper, stop_rx) = watch::channel(false);
            let reaper = tokio::spawn(
                reap(Arc::clone(&self.flows), self.settings, stop_rx).in_current_span(),
            );

            let mut workers = JoinSet::new();
            let mut buf = vec![0u8; self.settings.max_datagram_size];

            tracing::info!(address = %self.local_addr, "Forwarding datagrams");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,

                    Some(joined) = workers.join_next(), if !workers.is_empty() => {
                        if let Err(err) = joined {
                            if err.is_panic() {
                                tracing::error!(error = %err, "Flow worker panicked");
                            }
                        }
                    }

                    received = self.socket.recv_from(&mut buf) => match received {
                        Ok((n, client)) => {
                            let datagram = Bytes::copy_from_slice(&buf[..n]);
                            self.dispatch(datagram, client, &mut workers);
                        }
                        // Errors here belong to one peer (e.g. a stale ICMP
                        // report); the socket stays usable.
                        Err(err) => tracing::debug!(error = %err, "Receive failed"),
                    },
                }
            }

            let _ = stop_reaper.send(true);
            let _ = reaper.await;
            self.shutdown_flows(workers).await;
            tracing::info!("Forwarder stopped");
        }
        .instrument(span)
        .await
    }

    fn dispatch(&self, datagram: Bytes, client: SocketAddr, workers: &mut JoinSet<()>) {
        let datagram = match self.flows.get(&client) {
            Some(flow) => match flow.try_send(datagram) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(flow_id = %flow.id(), client = %client, "Flow queue full, dropping datagram");
                    metrics::record_datagram_dropped("queue_full");
                    return;
                }
                Err(TrySendError::Closed(datagram)) => {
                    self.flows.remove(&flow);
                    datagram
                }
            },
            None => datagram,
        };

        let Some(entry) = self.handler.load_full() else {
            tracing::trace!(client = %client, "No udp router for this entry point, dropping datagram");
            metrics::record_datagram_dropped("no_router");
            return;
        };

        let (flow, receiver) = Flow::new(client, self.settings.queue_depth);
        if self.flows.insert(Arc::clone(&flow)).is_err() {
            tracing::debug!(client = %client, max_flows = self.settings.max_flows, "Flow table full, dropping datagram");
            metrics::record_flow_rejected("flow_limit");
            metrics::record_datagram_dropped("flow_limit");
            return;
        }
        // A fresh queue always has room for the first datagram.
        let _ = flow.try_send(datagram);

        let span = tracing::debug_span!(
            "udp_flow",
            flow_id = %flow.id(),
            client = %client,
            router = %entry.router
        );
        let worker = FlowWorker {
            flow,
            entry,
            socket: Arc::clone(&self.socket),
            flows: Arc::clone(&self.flows),
            max_datagram_size: self.settings.max_datagram_size,
        };
        workers.spawn(worker.run(receiver).instrument(span));
    }

    async fn shutdown_flows(&self, mut workers: JoinSet<()>) {
        for flow in self.flows.drain() {
            flow.close(CloseReason::Shutdown);
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = workers.len(), "Aborting flow workers");
            workers.shutdown().await;
        }
    }
}

/// Periodically closes idle flows.
async fn reap(flows: Arc<FlowTable>, settings: ForwarderSettings, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(settings.reap_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for flow in flows.take_expired(settings.idle_timeout) {
                    tracing::trace!(flow_id = %flow.id(), client = %flow.client(), "Flow idle, closing");
                    flow.close(CloseReason::IdleTimeout);
                }
            }
            _ = stop.changed() => break,
        }
    }
}

/// Establishes one flow and relays its datagrams.
struct FlowWorker {
    flow: Arc<Flow>,
    entry: Arc<EntryPointHandler>,
    socket: Arc<UdpSocket>,
    flows: Arc<FlowTable>,
    max_datagram_size: usize,
}

impl FlowWorker {
    async fn run(self, receiver: FlowReceiver) {
        let FlowReceiver { mut queue, mut close } = receiver;
        let client = self.flow.client();

        let established = tokio::select! {
            reason = close.wait() => Err(reason),
            result = self.entry.handler.serve(client) => Ok(result),
        };

        let upstream = match established {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(err)) => {
                if err.is_rejection() {
                    tracing::debug!(error = %err, "Flow rejected");
                } else {
                    tracing::warn!(error = %err, "Failed to establish flow");
                }
                metrics::record_flow_rejected(err.reason());
                self.flow.close(CloseReason::Rejected);
                self.flows.remove(&self.flow);
                return;
            }
            Err(reason) => {
                tracing::trace!(reason = reason.as_str(), "Flow closed before it was established");
                self.flows.remove(&self.flow);
                return;
            }
        };

        if !self.flow.establish(upstream.backend) {
            self.flows.remove(&self.flow);
            return;
        }
        metrics::record_flow_established();
        tracing::debug!(backend = %upstream.backend, "Flow established");

        let reason = self.relay(&upstream, &mut queue, &mut close).await;

        self.flow.close(reason);
        self.flows.remove(&self.flow);
        metrics::record_flow_closed(reason.as_str());
        match reason {
            CloseReason::Shutdown => tracing::trace!("Flow closed by shutdown"),
            reason => tracing::debug!(reason = reason.as_str(), "Flow closed"),
        }
    }

    async fn relay(
        &self,
        upstream: &Upstream,
        queue: &mut tokio::sync::mpsc::Receiver<Bytes>,
        close: &mut CloseSignal,
    ) -> CloseReason {
        let client = self.flow.client();
        let mut buf = vec![0u8; self.max_datagram_size];

        loop {
            tokio::select! {
                reason = close.wait() => return reason,

                datagram = queue.recv() => {
                    let Some(datagram) = datagram else {
                        return CloseReason::Shutdown;
                    };
                    if let Err(err) = upstream.socket.send(&datagram).await {
                        tracing::debug!(error = %err, "Failed to write to backend");
                        return CloseReason::BackendError;
                    }
                    metrics::record_datagram("client_to_backend");
                }

                received = upstream.socket.recv(&mut buf) => {
                    let n = match received {
                        Ok(n) => n,
                        Err(err) => {
                            tracing::debug!(error = %err, "Failed to read from backend");
                            return CloseReason::BackendError;
                        }
                    };
                    self.flow.touch();
                    if let Err(err) = self.socket.send_to(&buf[..n], client).await {
                        tracing::debug!(error = %err, "Failed to write to client");
                        return CloseReason::ClientWriteError;
                    }
                    metrics::record_datagram("backend_to_client");
                }
            }
        }
    }
}
