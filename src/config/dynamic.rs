//! Canonical UDP configuration graph.
//!
//! This is the shape every provider must produce: three name-keyed
//! collections of routers, services and middlewares. Keys follow the
//! provider wire format (camelCase), so a file provider can be written as:
//!
//! ```toml
//! [udp.routers.dns]
//! entryPoints = ["dns"]
//! middlewares = ["internal-only"]
//! service = "dns-pool"
//!
//! [udp.services.dns-pool.loadBalancer]
//! servers = [{ address = "10.0.0.2:53" }, { address = "10.0.0.3:53", weight = 2 }]
//!
//! [udp.middlewares.internal-only.ipAllowList]
//! sourceRange = ["10.0.0.0/8"]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::runtime::provider::qualified_name;

/// Routers, services and middlewares for the UDP data plane.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UdpConfiguration {
    pub routers: BTreeMap<String, UdpRouter>,
    pub services: BTreeMap<String, UdpService>,
    pub middlewares: BTreeMap<String, UdpMiddleware>,
}

/// Binds entry points and an ordered middleware list to one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UdpRouter {
    /// Entry points this router listens on. Empty means every entry point.
    pub entry_points: Vec<String>,

    /// Middleware names, outermost first.
    pub middlewares: Vec<String>,

    /// Target service name.
    pub service: String,
}

/// A flat list of servers or a weighted composition of other services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UdpService {
    LoadBalancer(ServersLoadBalancer),
    Weighted(WeightedRoundRobin),
}

impl UdpService {
    /// Lowercase variant name, as shown by introspection.
    pub fn kind(&self) -> &'static str {
        match self {
            UdpService::LoadBalancer(_) => "loadbalancer",
            UdpService::Weighted(_) => "weighted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServersLoadBalancer {
    pub servers: Vec<BackendServer>,
}

/// One backend address. An absent weight counts as 1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendServer {
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WeightedRoundRobin {
    pub services: Vec<WeightedService>,
}

/// Reference to a child service inside a weighted service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeightedService {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// Middleware kinds. New kinds are added as variants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UdpMiddleware {
    IpAllowList(IpAllowList),
}

impl UdpMiddleware {
    pub fn kind(&self) -> &'static str {
        match self {
            UdpMiddleware::IpAllowList(_) => "ipallowlist",
        }
    }
}

/// Admits flows whose client address falls in one of the ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IpAllowList {
    /// Allowed IPs or CIDR ranges.
    pub source_range: Vec<String>,
}

impl UdpConfiguration {
    /// Suffix every entity name that has no provider with `@provider`.
    ///
    /// References inside routers and weighted services are left untouched;
    /// they are resolved relative to the referrer's provider at build time.
    pub fn qualified(self, provider: &str) -> Self {
        let provider = Some(provider);
        Self {
            routers: self
                .routers
                .into_iter()
                .map(|(name, router)| (qualified_name(provider, &name), router))
                .collect(),
            services: self
                .services
                .into_iter()
                .map(|(name, service)| (qualified_name(provider, &name), service))
                .collect(),
            middlewares: self
                .middlewares
                .into_iter()
                .map(|(name, middleware)| (qualified_name(provider, &name), middleware))
                .collect(),
        }
    }

    /// Merge the graphs of several providers into one qualified graph.
    ///
    /// Names are qualified per provider first, so two providers can use the
    /// same bare name without colliding.
    pub fn merge<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = (S, UdpConfiguration)>,
        S: AsRef<str>,
    {
        let mut merged = Self::default();
        for (provider, conf) in providers {
            let conf = conf.qualified(provider.as_ref());
            merged.routers.extend(conf.routers);
            merged.services.extend(conf.services);
            merged.middlewares.extend(conf.middlewares);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"
        [routers.dns]
        entryPoints = ["dns"]
        middlewares = ["internal"]
        service = "pool"

        [services.pool.weighted]
        services = [{ name = "a", weight = 3 }, { name = "b" }]

        [services.a.loadBalancer]
        servers = [{ address = "10.0.0.2:53" }]

        [services.b.loadBalancer]
        servers = [{ address = "10.0.0.3:53", weight = 2 }]

        [middlewares.internal.ipAllowList]
        sourceRange = ["10.0.0.0/8", "192.168.1.7"]
    "#;

    #[test]
    fn parses_canonical_graph() {
        let conf: UdpConfiguration = toml::from_str(GRAPH).unwrap();

        let router = &conf.routers["dns"];
        assert_eq!(router.entry_points, vec!["dns"]);
        assert_eq!(router.middlewares, vec!["internal"]);
        assert_eq!(router.service, "pool");

        match &conf.services["pool"] {
            UdpService::Weighted(wrr) => {
                assert_eq!(wrr.services.len(), 2);
                assert_eq!(wrr.services[0].weight, Some(3));
                assert_eq!(wrr.services[1].weight, None);
            }
            other => panic!("unexpected service {other:?}"),
        }

        match &conf.services["b"] {
            UdpService::LoadBalancer(lb) => assert_eq!(lb.servers[0].weight, Some(2)),
            other => panic!("unexpected service {other:?}"),
        }

        let UdpMiddleware::IpAllowList(allow) = &conf.middlewares["internal"];
        assert_eq!(allow.source_range, vec!["10.0.0.0/8", "192.168.1.7"]);

        assert_eq!(conf.services["pool"].kind(), "weighted");
        assert_eq!(conf.services["a"].kind(), "loadbalancer");
        assert_eq!(conf.middlewares["internal"].kind(), "ipallowlist");
    }

    #[test]
    fn service_must_pick_one_variant() {
        let both = r#"
            [services.x.loadBalancer]
            servers = []
            [services.x.weighted]
            services = []
        "#;
        assert!(toml::from_str::<UdpConfiguration>(both).is_err());
    }

    #[test]
    fn qualifies_bare_names_only() {
        let mut conf = UdpConfiguration::default();
        conf.routers.insert("r".into(), UdpRouter::default());
        conf.routers.insert("k@kubernetes".into(), UdpRouter::default());

        let conf = conf.qualified("file");
        let names: Vec<_> = conf.routers.keys().cloned().collect();
        assert_eq!(names, vec!["k@kubernetes", "r@file"]);
    }

    #[test]
    fn merge_keeps_same_bare_name_from_two_providers() {
        let mut file = UdpConfiguration::default();
        file.routers.insert("dns".into(), UdpRouter::default());
        let mut crd = UdpConfiguration::default();
        crd.routers.insert("dns".into(), UdpRouter::default());

        let merged = UdpConfiguration::merge([("file", file), ("kubernetescrd", crd)]);
        assert_eq!(merged.routers.len(), 2);
        assert!(merged.routers.contains_key("dns@file"));
        assert!(merged.routers.contains_key("dns@kubernetescrd"));
    }
}
