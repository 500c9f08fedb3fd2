//! UDP routing subsystem.
//!
//! # Data Flow
//! ```text
//! RuntimeConfiguration + configured entry point names
//!     → check router entry points (unknown → warning, none → disabled)
//!     → routers grouped by entry point
//!     → manager.rs (greatest router name wins per entry point)
//!         → service manager (recursive service expansion)
//!         → chain builder (qualified middleware names)
//!     → entry point name → EntryPointHandler
//! ```
//!
//! # Design Decisions
//! - Deterministic: the same configuration always selects the same router
//! - Handlers are rebuilt from scratch on every change and immutable after
//! - Status is written into the snapshot being built, never into a
//!   published one

pub mod manager;

pub use manager::Manager;
