//! Builds middleware chains from qualified middleware names.
//!
//! # Responsibilities
//! - Resolve each name against the runtime configuration
//! - Map each middleware kind to its constructor
//! - Record build errors on the failing middleware
//!
//! # Design Decisions
//! - Constructors are cached per rebuild, so a middleware shared by several
//!   routers is parsed once and reports its errors once
//! - A chain is all or nothing: one unresolvable name fails the chain

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::dynamic::UdpMiddleware;
use crate::error::BuildError;
use crate::handler::Handler;
use crate::middleware::chain::{Chain, Constructor};
use crate::middleware::ip_allow_list::IpAllowList;
use crate::runtime::RuntimeConfiguration;

/// Result of building one middleware, shared across routers.
type Built = Result<Constructor, BuildError>;

/// Builds chains for one rebuild of the runtime configuration.
#[derive(Default)]
pub struct ChainBuilder {
    built: HashMap<String, Built>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the chain for `names`, in order. Names must already be
    /// qualified with their provider.
    pub fn build_chain(
        &mut self,
        conf: &mut RuntimeConfiguration,
        names: &[String],
    ) -> Result<Chain, BuildError> {
        let mut chain = Chain::new();
        for name in names {
            chain = chain.append(self.constructor(conf, name)?);
        }
        Ok(chain)
    }

    fn constructor(
        &mut self,
        conf: &mut RuntimeConfiguration,
        name: &str,
    ) -> Result<Constructor, BuildError> {
        if let Some(built) = self.built.get(name) {
            return built.clone();
        }

        let info = conf
            .middlewares
            .get_mut(name)
            .ok_or_else(|| BuildError::UnknownMiddleware(name.to_string()))?;

        let built = build_middleware(name, &info.middleware);
        match &built {
            Ok(_) => {
                tracing::debug!(middleware = %name, kind = info.middleware.kind(), "Built udp middleware");
                if let UdpMiddleware::IpAllowList(allow) = &info.middleware {
                    if allow.source_range.is_empty() {
                        tracing::warn!(middleware = %name, "Empty ipAllowList, every flow will be dropped");
                        info.state
                            .add_error("sourceRange is empty, no client is allowed", false);
                    }
                }
            }
            Err(err) => {
                tracing::error!(middleware = %name, error = %err, "Failed to build udp middleware");
                info.state.add_error(err, true);
            }
        }

        self.built.insert(name.to_string(), built.clone());
        built
    }
}

/// Middleware registry: one constructor per kind.
fn build_middleware(name: &str, middleware: &UdpMiddleware) -> Built {
    match middleware {
        UdpMiddleware::IpAllowList(config) => {
            let list = IpAllowList::new(name, config)?;
            Ok(Arc::new(move |next: Arc<dyn Handler>| list.wrap(next)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dynamic::{self, UdpConfiguration};
    use crate::handler::test_support::{client, new_log, Recorder};
    use crate::runtime::Status;

    fn allow(ranges: &[&str]) -> UdpMiddleware {
        UdpMiddleware::IpAllowList(dynamic::IpAllowList {
            source_range: ranges.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn runtime(middlewares: &[(&str, UdpMiddleware)]) -> RuntimeConfiguration {
        let mut conf = UdpConfiguration::default();
        for (name, middleware) in middlewares {
            conf.middlewares.insert(name.to_string(), middleware.clone());
        }
        RuntimeConfiguration::new(conf)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn builds_chain_in_order() {
        let mut conf = runtime(&[
            ("loopback@file", allow(&["127.0.0.0/8"])),
            ("private@file", allow(&["10.0.0.0/8"])),
        ]);
        let mut builder = ChainBuilder::new();

        let log = new_log();
        let chain = builder
            .build_chain(&mut conf, &names(&["loopback@file"]))
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.then(Recorder::new("svc", &log)).serve(client(1)).await.is_ok());

        // Both lists must admit the client: loopback passes the first gate
        // and is dropped by the second.
        let chain = builder
            .build_chain(&mut conf, &names(&["loopback@file", "private@file"]))
            .unwrap();
        let err = chain
            .then(Recorder::new("svc", &log))
            .serve(client(2))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::handler::FlowError::Rejected { ref middleware, .. } if middleware == "private@file"));

        assert_eq!(*log.lock(), vec!["svc"]);
        assert_eq!(conf.middlewares["loopback@file"].state.status, Status::Enabled);
    }

    #[test]
    fn unknown_middleware_fails_the_chain() {
        let mut conf = runtime(&[("ok@file", allow(&["10.0.0.0/8"]))]);
        let err = ChainBuilder::new()
            .build_chain(&mut conf, &names(&["ok@file", "ghost@file"]))
            .unwrap_err();
        assert_eq!(err, BuildError::UnknownMiddleware("ghost@file".into()));
    }

    #[test]
    fn invalid_middleware_is_marked_error_once() {
        let mut conf = runtime(&[("bad@file", allow(&["not-an-ip"]))]);
        let mut builder = ChainBuilder::new();

        for _ in 0..2 {
            let err = builder
                .build_chain(&mut conf, &names(&["bad@file"]))
                .unwrap_err();
            assert!(matches!(err, BuildError::InvalidMiddleware { .. }));
        }

        let state = &conf.middlewares["bad@file"].state;
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.errors.len(), 1);
    }

    #[tokio::test]
    async fn empty_allow_list_is_a_warning_and_drops_everything() {
        let mut conf = runtime(&[("nobody@file", allow(&[]))]);
        let chain = ChainBuilder::new()
            .build_chain(&mut conf, &names(&["nobody@file"]))
            .unwrap();

        assert_eq!(conf.middlewares["nobody@file"].state.status, Status::Warning);

        let log = new_log();
        let result = chain.then(Recorder::new("svc", &log)).serve(client(1)).await;
        assert!(result.unwrap_err().is_rejection());
        assert!(log.lock().is_empty());
    }
}
