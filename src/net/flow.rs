//! Flow state machine and flow table.
//!
//! # Responsibilities
//! - Generate unique flow IDs for tracing
//! - Track flow state (Pending → Established → Closed)
//! - Buffer client datagrams until the flow's worker forwards them
//! - Signal the worker when the flow is closed from outside
//! - Index live flows by client address for one entry point

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

/// Global atomic counter for flow IDs.
static FLOW_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId(u64);

impl FlowId {
    /// Generate a new unique flow ID.
    pub fn new() -> Self {
        Self(FLOW_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flow-{}", self.0)
    }
}

/// Flow state for lifecycle tracking.
///
/// There is no way back from `Closed`: a later datagram from the same
/// client starts a new flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Handler chain is running; datagrams are queued.
    Pending,
    /// Backend dialed; datagrams are relayed both ways.
    Established,
    Closed,
}

/// Why a flow was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    IdleTimeout,
    BackendError,
    ClientWriteError,
    /// The handler chain refused or failed to establish the flow.
    Rejected,
    Shutdown,
}

impl CloseReason {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::BackendError => "backend_error",
            CloseReason::ClientWriteError => "client_write_error",
            CloseReason::Rejected => "rejected",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// One client's pseudo-connection through an entry point.
#[derive(Debug)]
pub struct Flow {
    id: FlowId,
    client: SocketAddr,
    queue: mpsc::Sender<Bytes>,
    state: Mutex<FlowState>,
    last_activity: Mutex<Instant>,
    backend: Mutex<Option<SocketAddr>>,
    close: watch::Sender<Option<CloseReason>>,
}

/// Worker side of a flow.
#[derive(Debug)]
pub struct FlowReceiver {
    /// Client datagrams waiting to be forwarded.
    pub queue: mpsc::Receiver<Bytes>,
    pub close: CloseSignal,
}

/// Resolves once the flow is closed from outside the worker.
#[derive(Debug)]
pub struct CloseSignal(watch::Receiver<Option<CloseReason>>);

impl CloseSignal {
    pub async fn wait(&mut self) -> CloseReason {
        loop {
            if let Some(reason) = *self.0.borrow_and_update() {
                return reason;
            }
            if self.0.changed().await.is_err() {
                return CloseReason::Shutdown;
            }
        }
    }
}

impl Flow {
    /// Create a pending flow for `client` with room for `queue_depth`
    /// datagrams.
    pub fn new(client: SocketAddr, queue_depth: usize) -> (Arc<Self>, FlowReceiver) {
        let (queue_tx, queue_rx) = mpsc::channel(queue_depth.max(1));
        let (close_tx, close_rx) = watch::channel(None);

        let flow = Arc::new(Self {
            id: FlowId::new(),
            client,
            queue: queue_tx,
            state: Mutex::new(FlowState::Pending),
            last_activity: Mutex::new(Instant::now()),
            backend: Mutex::new(None),
            close: close_tx,
        });
        let receiver = FlowReceiver {
            queue: queue_rx,
            close: CloseSignal(close_rx),
        };
        (flow, receiver)
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    pub fn state(&self) -> FlowState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == FlowState::Closed
    }

    /// Backend chosen for this flow, once established.
    pub fn backend(&self) -> Option<SocketAddr> {
        *self.backend.lock()
    }

    /// Queue a client datagram and stamp activity.
    pub fn try_send(&self, datagram: Bytes) -> Result<(), TrySendError<Bytes>> {
        if self.is_closed() {
            return Err(TrySendError::Closed(datagram));
        }
        self.queue.try_send(datagram)?;
        self.touch();
        Ok(())
    }

    /// Record traffic on the flow.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last datagram in either direction.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    /// Move a pending flow to `Established`. Returns false if it was
    /// closed meanwhile.
    pub fn establish(&self, backend: SocketAddr) -> bool {
        let mut state = self.state.lock();
        if *state != FlowState::Pending {
            return false;
        }
        *state = FlowState::Established;
        *self.backend.lock() = Some(backend);
        drop(state);
        self.touch();
        true
    }

    /// Close the flow. Only the first reason is kept; returns whether this
    /// call closed it.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock();
        if *state == FlowState::Closed {
            return false;
        }
        *state = FlowState::Closed;
        drop(state);

        self.close.send_replace(Some(reason));
        true
    }
}

/// Live flows of one entry point, keyed by client address.
#[derive(Debug)]
pub struct FlowTable {
    flows: DashMap<SocketAddr, Arc<Flow>>,
    max_flows: usize,
}

/// Returned when the table is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTableFull;

impl FlowTable {
    pub fn new(max_flows: usize) -> Self {
        Self {
            flows: DashMap::new(),
            max_flows,
        }
    }

    pub fn get(&self, client: &SocketAddr) -> Option<Arc<Flow>> {
        self.flows.get(client).map(|flow| Arc::clone(flow.value()))
    }

    /// Register a new flow, replacing any previous flow of the same client.
    pub fn insert(&self, flow: Arc<Flow>) -> Result<(), FlowTableFull> {
        if self.flows.len() >= self.max_flows && !self.flows.contains_key(&flow.client()) {
            return Err(FlowTableFull);
        }
        self.flows.insert(flow.client(), flow);
        Ok(())
    }

    /// Remove `flow`, unless its client already has a newer flow.
    pub fn remove(&self, flow: &Flow) -> bool {
        self.flows
            .remove_if(&flow.client(), |_, current| current.id() == flow.id())
            .is_some()
    }

    /// Remove and return every established flow idle for at least
    /// `idle_timeout`.
    ///
    /// Pending flows are left alone: their handler is still running and is
    /// bounded by the dial timeout, not the idle timeout.
    pub fn take_expired(&self, idle_timeout: Duration) -> Vec<Arc<Flow>> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.flows.retain(|_, flow| {
            if flow.state() != FlowState::Pending && flow.idle_for(now) >= idle_timeout {
                expired.push(Arc::clone(flow));
                false
            } else {
                true
            }
        });
        expired
    }

    /// Remove and return every flow.
    pub fn drain(&self) -> Vec<Arc<Flow>> {
        let clients: Vec<SocketAddr> = self.flows.iter().map(|entry| *entry.key()).collect();
        clients
            .into_iter()
            .filter_map(|client| self.flows.remove(&client).map(|(_, flow)| flow))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn flow_id_unique() {
        let id1 = FlowId::new();
        let id2 = FlowId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("flow-"));
    }

    #[tokio::test]
    async fn state_machine_never_reopens() {
        let (flow, mut rx) = Flow::new(client(1), 4);
        assert_eq!(flow.state(), FlowState::Pending);

        assert!(flow.establish(client(53)));
        assert_eq!(flow.state(), FlowState::Established);
        assert_eq!(flow.backend(), Some(client(53)));

        assert!(flow.close(CloseReason::IdleTimeout));
        assert!(!flow.close(CloseReason::Shutdown));
        assert!(!flow.establish(client(54)));
        assert_eq!(rx.close.wait().await, CloseReason::IdleTimeout);

        let err = flow.try_send(Bytes::from_static(b"late")).unwrap_err();
        assert!(matches!(err, TrySendError::Closed(_)));
    }

    #[tokio::test]
    async fn queue_is_bounded() {
        let (flow, mut rx) = Flow::new(client(1), 2);
        flow.try_send(Bytes::from_static(b"1")).unwrap();
        flow.try_send(Bytes::from_static(b"2")).unwrap();
        assert!(matches!(
            flow.try_send(Bytes::from_static(b"3")),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(rx.queue.recv().await.unwrap(), Bytes::from_static(b"1"));
    }

    #[test]
    fn table_enforces_capacity_and_identity() {
        let table = FlowTable::new(1);
        let (first, _rx1) = Flow::new(client(1), 1);
        let (other, _rx2) = Flow::new(client(2), 1);

        table.insert(Arc::clone(&first)).unwrap();
        assert_eq!(table.insert(other), Err(FlowTableFull));

        // A replacement for the same client fits and wins.
        let (second, _rx3) = Flow::new(client(1), 1);
        table.insert(Arc::clone(&second)).unwrap();
        assert!(!table.remove(&first));
        assert_eq!(table.get(&client(1)).unwrap().id(), second.id());
        assert!(table.remove(&second));
        assert!(table.is_empty());
    }

    #[test]
    fn take_expired_only_returns_idle_flows() {
        let table = FlowTable::new(10);
        let (idle, _rx1) = Flow::new(client(1), 1);
        let (busy, _rx2) = Flow::new(client(2), 1);
        assert!(idle.establish(client(53)));
        assert!(busy.establish(client(53)));
        *idle.last_activity.lock() = Instant::now() - Duration::from_secs(10);
        table.insert(Arc::clone(&idle)).unwrap();
        table.insert(Arc::clone(&busy)).unwrap();

        let expired = table.take_expired(Duration::from_secs(3));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), idle.id());
        assert_eq!(table.len(), 1);

        assert_eq!(table.drain().len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn take_expired_leaves_pending_flows_to_their_handler() {
        let table = FlowTable::new(10);
        let (dialing, _rx) = Flow::new(client(1), 1);
        *dialing.last_activity.lock() = Instant::now() - Duration::from_secs(10);
        table.insert(Arc::clone(&dialing)).unwrap();

        assert!(table.take_expired(Duration::from_secs(3)).is_empty());
        assert_eq!(table.len(), 1);

        // Once established, the same staleness expires it.
        assert!(dialing.establish(client(53)));
        *dialing.last_activity.lock() = Instant::now() - Duration::from_secs(10);
        assert_eq!(table.take_expired(Duration::from_secs(3)).len(), 1);
        assert!(table.is_empty());
    }
}
