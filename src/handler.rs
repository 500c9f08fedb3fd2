//! Flow handlers.
//!
//! A [`Handler`] is run once when a client sends its first datagram. It
//! either rejects the flow or returns the connected backend socket the flow
//! will use for its whole lifetime. Handlers compose: middlewares wrap a
//! next handler, a load balancer picks one child per flow, and the terminal
//! server handler dials the backend.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Backend side of an established flow.
#[derive(Debug)]
pub struct Upstream {
    /// Socket connected to `backend`.
    pub socket: UdpSocket,
    pub backend: SocketAddr,
}

/// Why a flow could not be established.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Dropped by a middleware. Never answered, only counted.
    #[error("flow from {client} rejected by middleware {middleware:?}")]
    Rejected {
        client: SocketAddr,
        middleware: String,
    },

    #[error("no server available in udp service {0:?}")]
    NoServer(String),

    #[error("failed to resolve backend {address:?}: {reason}")]
    Resolve { address: String, reason: String },

    #[error("failed to dial backend {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dialing backend {address} timed out after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },
}

impl FlowError {
    /// Silent drops decided by policy, as opposed to failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FlowError::Rejected { .. })
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FlowError::Rejected { .. } => "rejected",
            FlowError::NoServer(_) => "no_server",
            FlowError::Resolve { .. } => "resolve",
            FlowError::Dial { .. } => "dial",
            FlowError::DialTimeout { .. } => "dial_timeout",
        }
    }
}

pub type HandlerFuture<'a> = BoxFuture<'a, Result<Upstream, FlowError>>;

/// Establishes the backend side of a new flow.
pub trait Handler: Send + Sync + fmt::Debug {
    /// Authorize the flow from `client` and dial its backend.
    fn serve(&self, client: SocketAddr) -> HandlerFuture<'_>;
}

/// The handler serving one entry point, with the router it came from.
#[derive(Debug, Clone)]
pub struct EntryPointHandler {
    pub router: String,
    pub handler: Arc<dyn Handler>,
}

impl EntryPointHandler {
    pub fn new(router: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            router: router.into(),
            handler,
        }
    }
}
