//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Logging/metrics → Bind entry points
//!     → First rebuild → Watcher + signals → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop receiving → Stop reapers
//!     → Close flows (backend sockets) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then observability, then listeners
//! - Flow workers get a short grace period before being aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
