//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Entry point config
//!     → listener.rs (bind one UDP socket per entry point)
//!     → forwarder.rs (receive loop, flow dispatch, reaper)
//!     → flow.rs (per-client state machine, bounded queue, flow table)
//!
//! Flow States:
//!     Pending → Established → Closed
//!        └──────────────────────↑ (rejected, or closed before established)
//! ```
//!
//! # Design Decisions
//! - A flow is keyed by client socket address and never shared across
//!   entry points
//! - Bounded flow table and per-flow queues keep memory bounded
//! - Every flow is tracked so shutdown can close its backend socket

pub mod flow;
pub mod forwarder;
pub mod listener;

pub use forwarder::{Forwarder, ForwarderSettings, HandlerSlot};
pub use listener::{Listener, ListenerError};
