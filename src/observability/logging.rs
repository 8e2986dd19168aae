//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from the snapshot's `level` and `pretty`
//! - Honour `RUST_LOG` when set
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("redis_proxy={level},{level}", level = level.as_str()))
}

/// Install the global subscriber. Returns an error if one is already set.
pub fn init_logging(
    level: LogLevel,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if pretty {
        builder.pretty().try_init()
    } else {
        builder.json().flatten_event(true).try_init()
    }
}
