//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging → Register upstreams → Start reconcile loop
//!
//! Reconcile (reconcile.rs):
//!     Version changed → diff upstreams by name → remove vanished/changed → add new
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → stop reconcile loop → stop config tasks → shut registry down
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Reconciliation failures are logged; the next version change retries
//! - Shutdown has timeout: in-flight checkouts get a bounded grace period

pub mod reconcile;
pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
