//! Upstream error types.

use thiserror::Error;

/// Errors raised by a connection pool or one of its connections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// TCP connection to the backend could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A backend operation exceeded its deadline.
    #[error("{op} on {address} timed out")]
    Timeout { address: String, op: &'static str },

    /// No connection became free before the checkout deadline.
    #[error("connection pool for {address} exhausted ({max} in use)")]
    Exhausted { address: String, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with something other than the expected reply.
    #[error("unexpected reply from backend: {0}")]
    Protocol(String),

    /// The pool has been closed; it is permanently unusable.
    #[error("server is closed")]
    Closed,
}

impl PoolError {
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::Closed)
    }
}

/// Errors raised by the upstream registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Operation attempted after shutdown.
    #[error("server is closed")]
    Closed,

    #[error("upstream name already registered: {0}")]
    DuplicateName(String),

    #[error("upstream address already registered: {0}")]
    DuplicateAddress(String),

    #[error("upstream {name} not registered")]
    NotFound { name: String },

    /// The minimum pool could not be opened.
    #[error("failed to initialise pool for upstream {name}: {source}")]
    PoolInit {
        name: String,
        #[source]
        source: PoolError,
    },

    /// Closing a registered handle failed.
    #[error("failed to close upstream {name}: {source}")]
    Close {
        name: String,
        #[source]
        source: PoolError,
    },
}

impl RegistryError {
    /// True when the error signals an operation after shutdown, directly or
    /// through a handle that was already closed.
    pub fn is_closed(&self) -> bool {
        match self {
            RegistryError::Closed => true,
            RegistryError::Close { source, .. } => source.is_closed(),
            _ => false,
        }
    }
}
