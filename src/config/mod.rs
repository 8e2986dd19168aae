//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! locator (path / file:// / http(s)://)
//!     → source.rs (fetch raw bytes)
//!     → loader.rs (fingerprint, decode JSON/TOML)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!
//! Every poll interval:
//!     dynamic.rs poller refetches
//!     → fingerprint unchanged? skip
//!     → changed: hand off to applier
//!     → applier swaps Arc<Config> and stamps a new Version
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A failed refetch keeps the last good snapshot

pub mod duration;
pub mod dynamic;
pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;

pub use dynamic::{DynamicConfig, Version};
pub use loader::{ConfigError, Fingerprint};
pub use schema::{
    Config, Listener, LogLevel, Mirroring, Network, Options, Upstream, DEFAULT_POLL_INTERVAL_STR,
};
pub use source::{FetchError, Source};
pub use validation::ValidationError;
