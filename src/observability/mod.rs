//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with key/value fields (upstream, address, version)
//!     → logging.rs (subscriber: JSON or pretty, level from the snapshot)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The config poller and applier run inside named spans

pub mod logging;
