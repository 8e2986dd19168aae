//! Pooled upstream handle.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Upstream;
use crate::upstream::error::PoolError;
use crate::upstream::pool::{ConnectionPool, PoolStats, PooledConnection};

/// Grace period applied by [`UpstreamHandle::close`].
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Runtime object owning one upstream's connection pool together with the
/// definition that produced it.
///
/// The registry owns handles; callers receive shared references from lookups.
#[derive(Debug)]
pub struct UpstreamHandle {
    upstream: Arc<Upstream>,
    pool: Arc<ConnectionPool>,
}

impl UpstreamHandle {
    /// Build the handle, opening the minimum pool eagerly.
    pub async fn connect(upstream: Upstream) -> Result<Self, PoolError> {
        let upstream = Arc::new(upstream);
        let pool = ConnectionPool::connect(Arc::clone(&upstream)).await?;
        Ok(Self { upstream, pool })
    }

    pub fn name(&self) -> &str {
        &self.upstream.name
    }

    pub fn address(&self) -> &str {
        &self.upstream.address
    }

    pub fn database(&self) -> u32 {
        self.upstream.database
    }

    pub fn is_readonly(&self) -> bool {
        self.upstream.readonly
    }

    /// The definition this handle was built from.
    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub async fn checkout(&self) -> Result<PooledConnection, PoolError> {
        self.pool.checkout().await
    }

    /// Round-trip a `PING` on a pooled connection.
    pub async fn ping(&self) -> Result<(), PoolError> {
        let mut conn = self.checkout().await?;
        let reply = conn.command(&["PING"]).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(PoolError::Protocol(format!("PING: {}", reply)))
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close every pooled connection. Once closed, further calls return
    /// [`PoolError::Closed`].
    pub async fn close(&self) -> Result<(), PoolError> {
        self.close_within(DEFAULT_DRAIN_GRACE).await
    }

    pub async fn close_within(&self, grace: Duration) -> Result<(), PoolError> {
        self.pool.close(grace).await
    }
}
