//! Redis connection-multiplexing proxy library.
//!
//! Dynamic configuration and the upstream registry that the front-end
//! listeners route through.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::{Config, DynamicConfig, Version};
pub use lifecycle::Shutdown;
pub use upstream::{UpstreamHandle, UpstreamRegistry};
