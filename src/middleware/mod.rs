//! UDP middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Router middleware names (qualified by provider)
//!     → builder.rs (resolve names, registry by kind)
//!     → chain.rs (ordered constructors, first = outermost)
//!     → Chain::then(service handler)
//!     → composed Handler run once per new flow
//! ```
//!
//! # Design Decisions
//! - Middleware kinds are a closed enum; adding a kind means adding a
//!   variant and a registry arm
//! - Middlewares gate flow establishment only, never individual datagrams
//! - A rejected flow is dropped silently and leaves no flow entry behind

pub mod builder;
pub mod chain;
pub mod ip_allow_list;

pub use builder::ChainBuilder;
pub use chain::{Chain, Constructor};
pub use ip_allow_list::IpAllowList;
