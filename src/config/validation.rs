//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of the static configuration (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: &ProxyConfig → Result<(), Vec<ValidationError>>
//! - The routing graph is NOT validated here: a broken router, service or
//!   middleware is reported through its runtime status instead of rejecting
//!   the whole file

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entry point {entry_point:?}: invalid address {address:?}")]
    InvalidAddress { entry_point: String, address: String },

    #[error("entry point {0:?}: idle_timeout_ms must be greater than zero")]
    ZeroIdleTimeout(String),

    #[error("forwarder.{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("forwarder.max_datagram_size must be at most 65535, got {0}")]
    DatagramTooLarge(usize),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Parse an entry point address. A leading `:` binds every IPv4 interface
/// (`0.0.0.0`); IPv6 needs an explicit `[::]:port`.
pub fn parse_bind_address(address: &str) -> Option<SocketAddr> {
    if let Some(port) = address.strip_prefix(':') {
        return format!("0.0.0.0:{port}").parse().ok();
    }
    address.parse().ok()
}

/// Validate the static part of the configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, entry_point) in &config.entry_points {
        if parse_bind_address(&entry_point.address).is_none() {
            errors.push(ValidationError::InvalidAddress {
                entry_point: name.clone(),
                address: entry_point.address.clone(),
            });
        }
        if entry_point.idle_timeout_ms == 0 {
            errors.push(ValidationError::ZeroIdleTimeout(name.clone()));
        }
    }

    let forwarder = &config.forwarder;
    let limits = [
        ("dial_timeout_ms", forwarder.dial_timeout_ms as usize),
        ("max_flows", forwarder.max_flows),
        ("queue_depth", forwarder.queue_depth),
        ("max_datagram_size", forwarder.max_datagram_size),
    ];
    for (field, value) in limits {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit(field));
        }
    }
    if forwarder.reap_interval_ms == Some(0) {
        errors.push(ValidationError::ZeroLimit("reap_interval_ms"));
    }
    if forwarder.max_datagram_size > 65_535 {
        errors.push(ValidationError::DatagramTooLarge(forwarder.max_datagram_size));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
