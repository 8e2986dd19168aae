//! Upstream subsystem: backend connection pools and their registry.
//!
//! # Data Flow
//! ```text
//! Upstream definition
//!     → registry.rs (reject duplicates, build handle, index by name + address)
//!     → handle.rs (definition + pool)
//!     → pool.rs (bounded checkout/checkin, drain on close)
//!     → connection.rs (dial, SELECT, PING)
//!
//! Forwarding path:
//!     lookup_by_name / lookup_by_address → handle.checkout() → guard dropped → checkin
//! ```
//!
//! # Design Decisions
//! - The registry lock guards structure only; each pool synchronises its own checkouts
//! - A closed pool stays closed; every later operation yields "server is closed"
//! - Shutdown closes every handle even when some fail

pub mod connection;
pub mod error;
pub mod handle;
pub mod pool;
pub mod registry;

pub use error::{PoolError, RegistryError};
pub use handle::UpstreamHandle;
pub use pool::{PoolStats, PooledConnection};
pub use registry::UpstreamRegistry;
