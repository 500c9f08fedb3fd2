//! Per-entry-point handler construction.
//!
//! # Responsibilities
//! - Pick the single active router of each entry point
//! - Build the router's service and middleware chain
//! - Write the outcome back into the runtime configuration status
//!
//! # Design Decisions
//! - UDP has no routing criteria, so only one router can serve an entry
//!   point: the lexicographically greatest name wins, the others are
//!   flagged with a warning
//! - Build failures are recorded on the router and never abort the
//!   rebuild of other entry points

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BuildError;
use crate::handler::{EntryPointHandler, Handler};
use crate::middleware::ChainBuilder;
use crate::runtime::provider::qualified_name;
use crate::runtime::RuntimeConfiguration;
use crate::service::ServiceManager;

/// Builds the entry point handlers for one runtime configuration.
#[derive(Debug, Clone)]
pub struct Manager {
    services: ServiceManager,
}

impl Manager {
    pub fn new(services: ServiceManager) -> Self {
        Self { services }
    }

    /// Build one handler per entry point that has a usable router.
    ///
    /// Entry points without a router, or whose winning router fails to
    /// build, get no handler; their traffic is dropped.
    pub fn build_handlers(
        &self,
        conf: &mut RuntimeConfiguration,
        entry_points: &[String],
    ) -> BTreeMap<String, EntryPointHandler> {
        conf.check_router_entry_points(entry_points);

        let candidates: BTreeMap<String, Vec<String>> = conf
            .routers_by_entry_points(entry_points)
            .into_iter()
            .map(|(entry_point, routers)| (entry_point, routers.into_keys().collect()))
            .collect();

        let mut chains = ChainBuilder::new();
        let mut handlers = BTreeMap::new();

        for entry_point in entry_points {
            let span = tracing::info_span!("udp_entry_point", entry_point = %entry_point);
            let _enter = span.enter();

            // Router names come sorted ascending; the greatest wins.
            let Some((winner, shadowed)) = candidates
                .get(entry_point)
                .and_then(|names| names.split_last())
            else {
                tracing::debug!("No udp router for this entry point");
                continue;
            };

            if !shadowed.is_empty() {
                tracing::warn!(
                    router = %winner,
                    shadowed = ?shadowed,
                    "Config has more than one udp router for a given entry point"
                );
                for name in shadowed {
                    if let Some(info) = conf.routers.get_mut(name) {
                        info.state.add_error(
                            format!("shadowed by udp router {winner:?} on entryPoint {entry_point:?}"),
                            false,
                        );
                    }
                }
            }

            match self.build_router(conf, &mut chains, winner) {
                Ok(handler) => {
                    tracing::debug!(router = %winner, "Built udp handler");
                    handlers.insert(entry_point.clone(), EntryPointHandler::new(winner.clone(), handler));
                }
                Err(err) => {
                    let class = if err.is_resolution() { "resolution" } else { "config" };
                    tracing::error!(router = %winner, error = %err, class, "Failed to build udp router");
                    if let Some(info) = conf.routers.get_mut(winner) {
                        info.state.add_error(&err, true);
                    }
                }
            }
        }

        conf.populate_used_by();
        handlers
    }

    fn build_router(
        &self,
        conf: &mut RuntimeConfiguration,
        chains: &mut ChainBuilder,
        name: &str,
    ) -> Result<Arc<dyn Handler>, BuildError> {
        let Some(info) = conf.routers.get_mut(name) else {
            return Err(BuildError::MissingService);
        };
        if info.router.service.is_empty() {
            return Err(BuildError::MissingService);
        }

        let provider = info.provider.clone();
        let middlewares: Vec<String> = info
            .router
            .middlewares
            .iter()
            .map(|middleware| qualified_name(provider.as_deref(), middleware))
            .collect();
        info.router.middlewares = middlewares.clone();
        let service = info.router.service.clone();

        let handler = self.services.build(conf, &service, provider.as_deref())?;
        let chain = chains.build_chain(conf, &middlewares)?;
        Ok(chain.then(handler))
    }
}
