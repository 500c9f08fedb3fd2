//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks on the static part)
//!     → ProxyConfig (validated, immutable)
//!         ├─ entry points / forwarder limits   (bound once at startup)
//!         └─ udp: UdpConfiguration             (dynamic.rs, hot reloaded)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new ProxyConfig sent to the server
//!     → full rebuild of the routing graph
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Errors in the routing graph never reject a file; they surface as
//!   per-entity status in the runtime snapshot

pub mod dynamic;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use dynamic::{
    BackendServer, IpAllowList, ServersLoadBalancer, UdpConfiguration, UdpMiddleware,
    UdpRouter, UdpService, WeightedRoundRobin, WeightedService,
};
pub use schema::{EntryPointConfig, ForwarderConfig, ObservabilityConfig, ProxyConfig};
