//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All violations are collected so an operator sees every problem at once.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

const MIN_BUFFER_SIZE: usize = 512;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;
const MIN_HEAD_BYTES: usize = 1024;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning every violation found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&config.relay.buffer_size) {
        errors.push(ValidationError::new(
            "relay.buffer_size",
            format!("must be between {} and {}", MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
        ));
    }
    if config.http.max_head_bytes < MIN_HEAD_BYTES {
        errors.push(ValidationError::new(
            "http.max_head_bytes",
            format!("must be at least {}", MIN_HEAD_BYTES),
        ));
    }
    if config.http.max_headers == 0 {
        errors.push(ValidationError::new("http.max_headers", "must be greater than 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
