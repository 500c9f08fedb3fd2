//! Runtime configuration graph and entity status.
//!
//! # Data Flow
//! ```text
//! UdpConfiguration (qualified, from providers)
//!     → RuntimeConfiguration::new (every entity Enabled)
//!     → routing manager builds handlers, annotating status/errors
//!     → populate_used_by (back-references for introspection)
//!     → published as one immutable snapshot (ArcSwap)
//! ```
//!
//! # Design Decisions
//! - Each rebuild produces a fresh snapshot; nothing is patched in place
//!   once published
//! - Errors are attached to the entity that caused them and never abort
//!   the rebuild of siblings
//! - Critical errors mark an entity `error`; others mark it `warning`

pub mod provider;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::dynamic::{UdpConfiguration, UdpMiddleware, UdpRouter, UdpService};

/// Status of a router, service or middleware after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Enabled,
    Disabled,
    Warning,
    Error,
}

/// Status and error list shared by every runtime entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityStatus {
    pub status: Status,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Default for EntityStatus {
    fn default() -> Self {
        Self {
            status: Status::Enabled,
            errors: Vec::new(),
        }
    }
}

impl EntityStatus {
    /// Record an error. Critical errors mark the entity `error`; others only
    /// downgrade an enabled entity to `warning`. Duplicate messages are
    /// recorded once.
    pub fn add_error(&mut self, err: impl fmt::Display, critical: bool) {
        let message = err.to_string();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }

        if critical {
            self.status = Status::Error;
        } else if self.status == Status::Enabled {
            self.status = Status::Warning;
        }
    }

    /// Take the entity out of service entirely.
    pub fn disable(&mut self, reason: impl fmt::Display) {
        self.add_error(reason, false);
        self.status = Status::Disabled;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterInfo {
    #[serde(flatten)]
    pub router: UdpRouter,

    #[serde(flatten)]
    pub state: EntityStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(flatten)]
    pub service: UdpService,

    #[serde(flatten)]
    pub state: EntityStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Routers that reference this service.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub used_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareInfo {
    #[serde(flatten)]
    pub middleware: UdpMiddleware,

    #[serde(flatten)]
    pub state: EntityStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Routers that reference this middleware.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub used_by: Vec<String>,
}

/// Annotated snapshot of the UDP routing graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuntimeConfiguration {
    pub routers: BTreeMap<String, RouterInfo>,
    pub services: BTreeMap<String, ServiceInfo>,
    pub middlewares: BTreeMap<String, MiddlewareInfo>,
}

impl RuntimeConfiguration {
    /// Wrap a qualified configuration graph; every entity starts enabled.
    pub fn new(conf: UdpConfiguration) -> Self {
        let owner = |name: &str| provider::provider_name(name).map(str::to_string);

        Self {
            routers: conf
                .routers
                .into_iter()
                .map(|(name, router)| {
                    let info = RouterInfo {
                        router,
                        state: EntityStatus::default(),
                        provider: owner(&name),
                    };
                    (name, info)
                })
                .collect(),
            services: conf
                .services
                .into_iter()
                .map(|(name, service)| {
                    let info = ServiceInfo {
                        service,
                        state: EntityStatus::default(),
                        provider: owner(&name),
                        used_by: Vec::new(),
                    };
                    (name, info)
                })
                .collect(),
            middlewares: conf
                .middlewares
                .into_iter()
                .map(|(name, middleware)| {
                    let info = MiddlewareInfo {
                        middleware,
                        state: EntityStatus::default(),
                        provider: owner(&name),
                        used_by: Vec::new(),
                    };
                    (name, info)
                })
                .collect(),
        }
    }

    /// Flag routers that reference entry points outside `entry_points`.
    ///
    /// Unknown entry points are a warning; a router left with no known entry
    /// point at all is disabled.
    pub fn check_router_entry_points(&mut self, entry_points: &[String]) {
        for (name, info) in &mut self.routers {
            if info.router.entry_points.is_empty() {
                continue;
            }

            let mut known = 0;
            for entry_point in &info.router.entry_points {
                if entry_points.contains(entry_point) {
                    known += 1;
                } else {
                    tracing::warn!(router = %name, entry_point = %entry_point, "Router references an unknown entry point");
                    info.state
                        .add_error(format!("entryPoint {entry_point:?} doesn't exist"), false);
                }
            }

            if known == 0 {
                tracing::error!(router = %name, "No valid entry point for this router");
                info.state.disable("no valid entryPoint for this router");
            }
        }
    }

    /// Routers attached to each of `entry_points`, keyed by router name.
    ///
    /// A router with no explicit entry point is attached to all of them.
    /// Disabled routers are left out.
    pub fn routers_by_entry_points(
        &self,
        entry_points: &[String],
    ) -> BTreeMap<String, BTreeMap<String, &RouterInfo>> {
        let mut by_entry_point: BTreeMap<String, BTreeMap<String, &RouterInfo>> = BTreeMap::new();

        for (name, info) in &self.routers {
            if info.state.status == Status::Disabled {
                continue;
            }

            for entry_point in entry_points {
                let listed = info.router.entry_points.is_empty()
                    || info.router.entry_points.contains(entry_point);
                if listed {
                    by_entry_point
                        .entry(entry_point.clone())
                        .or_default()
                        .insert(name.clone(), info);
                }
            }
        }

        by_entry_point
    }

    /// Fill `used_by` on services and middlewares from router references.
    ///
    /// Router references must already be qualified.
    pub fn populate_used_by(&mut self) {
        for info in self.services.values_mut() {
            info.used_by.clear();
        }
        for info in self.middlewares.values_mut() {
            info.used_by.clear();
        }

        for (name, router) in &self.routers {
            let service =
                provider::qualified_name(router.provider.as_deref(), &router.router.service);
            if let Some(info) = self.services.get_mut(&service) {
                info.used_by.push(name.clone());
            }

            for middleware in &router.router.middlewares {
                let middleware =
                    provider::qualified_name(router.provider.as_deref(), middleware);
                if let Some(info) = self.middlewares.get_mut(&middleware) {
                    if !info.used_by.contains(name) {
                        info.used_by.push(name.clone());
                    }
                }
            }
        }
    }

    /// Number of routers currently in the given status.
    pub fn count_routers(&self, status: Status) -> usize {
        self.routers
            .values()
            .filter(|info| info.state.status == status)
            .count()
    }
}
