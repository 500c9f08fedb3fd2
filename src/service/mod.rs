//! UDP service subsystem.
//!
//! # Data Flow
//! ```text
//! Router service name (qualified by the router's provider)
//!     → manager.rs (look up ServiceInfo, detect cycles)
//!         → loadBalancer → WeightedRoundRobin over ServerHandlers
//!         → weighted → WeightedRoundRobin over expanded child services
//!     → Arc<dyn Handler> wrapped by the router's middleware chain
//! ```

pub mod manager;

pub use manager::ServiceManager;
