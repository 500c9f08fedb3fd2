//! UDP reverse proxy data plane.
//!
//! Entry points receive datagrams, the single active router of each entry
//! point gates new flows through its middleware chain, and a smooth
//! weighted round-robin picks the backend a flow keeps for its lifetime.

// Configuration and runtime state
pub mod config;
pub mod error;
pub mod runtime;

// Handler construction
pub mod handler;
pub mod load_balancer;
pub mod middleware;
pub mod routing;
pub mod service;

// Data plane
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use server::{ServerHandle, UdpServer};
