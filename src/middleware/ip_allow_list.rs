//! Source-IP allow list.
//!
//! Evaluated once, when a flow is established, against the client address.
//! A client outside every range is dropped silently: no reply, no flow.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future;
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

use crate::config::dynamic;
use crate::error::BuildError;
use crate::handler::{FlowError, Handler, HandlerFuture};

/// Parsed allow list, shared by every handler built from one middleware.
#[derive(Debug, Clone)]
pub struct IpAllowList {
    name: String,
    networks: Arc<Vec<IpNetwork>>,
}

impl IpAllowList {
    /// Parse the configured source ranges. Any invalid entry fails the
    /// whole middleware.
    pub fn new(name: &str, config: &dynamic::IpAllowList) -> Result<Self, BuildError> {
        let networks = config
            .source_range
            .iter()
            .map(|entry| parse_ip_or_network(entry.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| BuildError::invalid_middleware(name, reason))?;

        Ok(Self {
            name: name.to_string(),
            networks: Arc::new(networks),
        })
    }

    /// True when no range is configured, i.e. nothing is admitted.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Whether `ip` falls within any allowed range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|network| network.contains(ip))
    }

    /// Wrap `next` so that only allowed clients reach it.
    pub fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(IpAllowListHandler {
            list: self.clone(),
            next,
        })
    }
}

#[derive(Debug)]
struct IpAllowListHandler {
    list: IpAllowList,
    next: Arc<dyn Handler>,
}

impl Handler for IpAllowListHandler {
    fn serve(&self, client: SocketAddr) -> HandlerFuture<'_> {
        if !self.list.contains(client.ip()) {
            tracing::debug!(
                middleware = %self.list.name,
                client = %client,
                "Client address not in allow list, dropping flow"
            );
            return Box::pin(future::ready(Err(FlowError::Rejected {
                client,
                middleware: self.list.name.clone(),
            })));
        }

        self.next.serve(client)
    }
}

/// Parse an IP address or CIDR network.
fn parse_ip_or_network(s: &str) -> Result<IpNetwork, String> {
    if let Ok(network) = IpNetwork::from_str(s) {
        return Ok(network);
    }

    match IpAddr::from_str(s) {
        Ok(IpAddr::V4(v4)) => Ipv4Network::new(v4, 32)
            .map(IpNetwork::V4)
            .map_err(|e| e.to_string()),
        Ok(IpAddr::V6(v6)) => Ipv6Network::new(v6, 128)
            .map(IpNetwork::V6)
            .map_err(|e| e.to_string()),
        Err(_) => Err(format!("invalid IP address or network {s:?}")),
    }
}
