//! Terminal handler: dials one backend server.
//!
//! # Responsibilities
//! - Resolve the backend address (host names allowed)
//! - Bind a local socket of the matching family and connect it
//! - Bound the whole dial by the configured timeout

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};

use crate::handler::{FlowError, Handler, HandlerFuture, Upstream};

/// Dials a fresh connected socket to one backend for every new flow.
#[derive(Debug, Clone)]
pub struct ServerHandler {
    address: String,
    dial_timeout: Duration,
}

impl ServerHandler {
    pub fn new(address: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            dial_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Handler for ServerHandler {
    fn serve(&self, client: SocketAddr) -> HandlerFuture<'_> {
        Box::pin(async move {
            let upstream = dial(&self.address, self.dial_timeout).await?;
            tracing::debug!(client = %client, backend = %upstream.backend, "Dialed backend");
            Ok(upstream)
        })
    }
}

/// Check that `address` has the `host:port` shape before any dial happens.
pub fn validate_address(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("missing port in address {address:?}"))?;
    if host.is_empty() {
        return Err(format!("missing host in address {address:?}"));
    }
    port.parse::<u16>()
        .map_err(|_| format!("invalid port in address {address:?}"))?;
    Ok(())
}

/// Resolve `address` and connect a new UDP socket to it.
pub async fn dial(address: &str, timeout: Duration) -> Result<Upstream, FlowError> {
    match tokio::time::timeout(timeout, connect(address)).await {
        Ok(result) => result,
        Err(_) => Err(FlowError::DialTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

async fn connect(address: &str) -> Result<Upstream, FlowError> {
    let backend = lookup_host(address)
        .await
        .map_err(|e| FlowError::Resolve {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| FlowError::Resolve {
            address: address.to_string(),
            reason: "no address found".into(),
        })?;

    let local: SocketAddr = if backend.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let dial_err = |source| FlowError::Dial {
        address: address.to_string(),
        source,
    };
    let socket = UdpSocket::bind(local).await.map_err(dial_err)?;
    socket.connect(backend).await.map_err(dial_err)?;

    Ok(Upstream { socket, backend })
}
