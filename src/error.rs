//! Build-time errors.
//!
//! These are attached to the entity that failed and reported through its
//! status; they never abort a rebuild.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("the service is missing on the udp router")]
    MissingService,

    #[error("the udp service {0:?} does not exist")]
    UnknownService(String),

    #[error("the udp middleware {0:?} does not exist")]
    UnknownMiddleware(String),

    #[error("cyclic reference between udp services: {}", .0.join(" -> "))]
    CyclicService(Vec<String>),

    #[error("invalid udp service {name:?}: {reason}")]
    InvalidService { name: String, reason: String },

    #[error("invalid udp middleware {name:?}: {reason}")]
    InvalidMiddleware { name: String, reason: String },
}

impl BuildError {
    pub(crate) fn invalid_service(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidService {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_middleware(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMiddleware {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by a reference to something that cannot be
    /// resolved, as opposed to a malformed definition.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::UnknownService(_) | Self::UnknownMiddleware(_) | Self::CyclicService(_)
        )
    }
}
