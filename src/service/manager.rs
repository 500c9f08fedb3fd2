//! Recursive expansion of service definitions into handlers.
//!
//! # Responsibilities
//! - Turn a `loadBalancer` service into a weighted pick over server dialers
//! - Turn a `weighted` service into a weighted pick over child services,
//!   expanding each child recursively
//! - Detect reference cycles along the current expansion path
//! - Record failures on every service along the failing path
//!
//! # Design Decisions
//! - Services are expanded per router, so each router gets its own
//!   selection state
//! - Child names are resolved relative to the parent's provider

use std::sync::Arc;
use std::time::Duration;

use crate::config::dynamic::{ServersLoadBalancer, UdpService, WeightedRoundRobin as WeightedConfig};
use crate::error::BuildError;
use crate::handler::Handler;
use crate::load_balancer::server::{self, ServerHandler};
use crate::load_balancer::WeightedRoundRobin;
use crate::runtime::provider::qualified_name;
use crate::runtime::RuntimeConfiguration;

/// Builds service handlers from the runtime configuration.
#[derive(Debug, Clone)]
pub struct ServiceManager {
    dial_timeout: Duration,
}

impl ServiceManager {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// Build the handler for service `name`, referenced from an entity of
    /// `provider`.
    pub fn build(
        &self,
        conf: &mut RuntimeConfiguration,
        name: &str,
        provider: Option<&str>,
    ) -> Result<Arc<dyn Handler>, BuildError> {
        let mut path = Vec::new();
        self.build_service(conf, &qualified_name(provider, name), &mut path)
    }

    fn build_service(
        &self,
        conf: &mut RuntimeConfiguration,
        name: &str,
        path: &mut Vec<String>,
    ) -> Result<Arc<dyn Handler>, BuildError> {
        if let Some(start) = path.iter().position(|seen| seen == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(BuildError::CyclicService(cycle));
        }

        let info = conf
            .services
            .get(name)
            .ok_or_else(|| BuildError::UnknownService(name.to_string()))?;
        let service = info.service.clone();
        let provider = info.provider.clone();

        tracing::debug!(service = %name, kind = service.kind(), "Building udp service");
        path.push(name.to_string());
        let built = match &service {
            UdpService::LoadBalancer(lb) => self.build_load_balancer(name, lb),
            UdpService::Weighted(weighted) => {
                self.build_weighted(conf, name, provider.as_deref(), weighted, path)
            }
        };
        path.pop();

        if let Err(err) = &built {
            if let Some(info) = conf.services.get_mut(name) {
                info.state.add_error(err, true);
            }
        }
        built
    }

    fn build_load_balancer(
        &self,
        name: &str,
        config: &ServersLoadBalancer,
    ) -> Result<Arc<dyn Handler>, BuildError> {
        if config.servers.is_empty() {
            return Err(BuildError::invalid_service(name, "no servers defined"));
        }

        let mut lb = WeightedRoundRobin::new(name);
        for backend in &config.servers {
            server::validate_address(&backend.address)
                .map_err(|reason| BuildError::invalid_service(name, reason))?;

            let handler = ServerHandler::new(backend.address.clone(), self.dial_timeout);
            tracing::debug!(service = %name, server = %handler.address(), weight = ?backend.weight, "Added server");
            lb.add(backend.address.clone(), Arc::new(handler), backend.weight);
        }

        if lb.total_weight() == 0 {
            return Err(BuildError::invalid_service(name, "all server weights are zero"));
        }
        Ok(Arc::new(lb))
    }

    fn build_weighted(
        &self,
        conf: &mut RuntimeConfiguration,
        name: &str,
        provider: Option<&str>,
        config: &WeightedConfig,
        path: &mut Vec<String>,
    ) -> Result<Arc<dyn Handler>, BuildError> {
        if config.services.is_empty() {
            return Err(BuildError::invalid_service(name, "no child services defined"));
        }

        let mut wrr = WeightedRoundRobin::new(name);
        for child in &config.services {
            let child_name = qualified_name(provider, &child.name);
            let handler = self.build_service(conf, &child_name, path)?;
            wrr.add(child_name, handler, child.weight);
        }

        if wrr.total_weight() == 0 {
            return Err(BuildError::invalid_service(name, "all child weights are zero"));
        }
        Ok(Arc::new(wrr))
    }
}
