//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! New flow reaches a service handler
//!     → wrr.rs (smooth weighted pick among children)
//!         → child is a nested WeightedRoundRobin → pick again
//!         → child is a ServerHandler
//!     → server.rs (resolve + connect a UDP socket to the backend)
//!     → Upstream returned to the forwarder, kept for the flow's lifetime
//! ```
//!
//! # Design Decisions
//! - Deterministic selection, never random
//! - One pick per flow, not per datagram
//! - Nested services are composed as children, not flattened

pub mod server;
pub mod wrr;

pub use server::ServerHandler;
pub use wrr::WeightedRoundRobin;
