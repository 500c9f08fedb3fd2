//! UDP entry point sockets.
//!
//! # Responsibilities
//! - Parse the configured entry point address
//! - Bind the listening socket
//! - Report bind failures with the entry point name

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::config::schema::EntryPointConfig;
use crate::config::validation::parse_bind_address;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("entry point {entry_point:?}: invalid address {address:?}")]
    Address { entry_point: String, address: String },

    #[error("entry point {entry_point:?}: failed to bind {address}: {source}")]
    Bind {
        entry_point: String,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A bound entry point socket.
#[derive(Debug)]
pub struct Listener {
    name: String,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind the socket of entry point `name`.
    pub async fn bind(name: &str, config: &EntryPointConfig) -> Result<Self, ListenerError> {
        let address = parse_bind_address(&config.address).ok_or_else(|| ListenerError::Address {
            entry_point: name.to_string(),
            address: config.address.clone(),
        })?;

        let bind_err = |source| ListenerError::Bind {
            entry_point: name.to_string(),
            address,
            source,
        };
        let socket = UdpSocket::bind(address).await.map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        tracing::info!(
            entry_point = %name,
            address = %local_addr,
            idle_timeout_ms = config.idle_timeout_ms,
            "Listener bound"
        );

        Ok(Self {
            name: name.to_string(),
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_point(address: &str) -> EntryPointConfig {
        EntryPointConfig {
            address: address.to_string(),
            ..EntryPointConfig::default()
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind("dns", &entry_point("127.0.0.1:0")).await.unwrap();
        assert_eq!(listener.name(), "dns");
        assert!(listener.local_addr().ip().is_loopback());
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn reports_bad_address_and_port_in_use() {
        let err = Listener::bind("dns", &entry_point("nowhere")).await.unwrap_err();
        assert!(matches!(err, ListenerError::Address { .. }));

        let first = Listener::bind("a", &entry_point("127.0.0.1:0")).await.unwrap();
        let taken = first.local_addr().to_string();
        let err = Listener::bind("b", &entry_point(&taken)).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { ref entry_point, .. } if entry_point == "b"));
    }
}
