//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, spans per entry point
//!       rebuild and per flow)
//!     → metrics.rs (flow and datagram counters, active flow gauge)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Flow IDs and client addresses flow through span fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
