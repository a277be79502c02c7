//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate; per-connection context travels in spans
//! - `RUST_LOG` wins over the configured level
//! - JSON format for machine parsing, pretty format for development

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("forward_proxy={0},{0}", config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global tracing subscriber.
///
/// Only the binary calls this; library code and tests never install one.
pub fn init(config: &ObservabilityConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    }
}
