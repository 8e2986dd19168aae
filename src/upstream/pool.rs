//! Bounded connection pool for one upstream.
//!
//! # Responsibilities
//! - Open `min_pool_size` connections eagerly
//! - Bound concurrent checkouts to the maximum size via a semaphore
//! - Return connections to the idle set when the checkout guard drops
//! - Close: refuse new checkouts, drop idle connections, let in-flight ones
//!   finish up to a grace period, then shut their sockets down
//!
//! The pool's locks (idle set, active sockets) are never held across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Upstream;
use crate::upstream::connection::{BackendConnection, ShutdownHandle};
use crate::upstream::error::PoolError;

/// Maximum size used when an upstream leaves `maxPoolSize` at 0.
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;

/// Deadline for dialing a backend and for waiting on a free slot.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll period while draining in-flight checkouts.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub max: usize,
}

#[derive(Debug)]
pub struct ConnectionPool {
    upstream: Arc<Upstream>,
    max: usize,
    connect_timeout: Duration,
    idle: Mutex<Vec<BackendConnection>>,
    /// Sockets of checked-out connections, by checkout id.
    active: Mutex<HashMap<u64, ShutdownHandle>>,
    next_id: AtomicU64,
    permits: Arc<Semaphore>,
    in_use: AtomicUsize,
    closed: AtomicBool,
    /// Set once the grace period of `close` has expired.
    force_closed: AtomicBool,
}

impl ConnectionPool {
    /// Create the pool and open its minimum connections.
    ///
    /// Connections already opened are dropped if any of them fails.
    pub async fn connect(upstream: Arc<Upstream>) -> Result<Arc<Self>, PoolError> {
        Self::connect_with_timeout(upstream, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        upstream: Arc<Upstream>,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>, PoolError> {
        let max = if upstream.max_pool_size == 0 {
            DEFAULT_MAX_POOL_SIZE.max(upstream.min_pool_size)
        } else {
            upstream.max_pool_size
        };

        let mut idle = Vec::with_capacity(upstream.min_pool_size);
        for _ in 0..upstream.min_pool_size.min(max) {
            idle.push(BackendConnection::open(&upstream, connect_timeout).await?);
        }

        tracing::debug!(
            upstream = %upstream.name,
            address = %upstream.address,
            opened = idle.len(),
            max,
            "Connection pool ready"
        );

        Ok(Arc::new(Self {
            upstream,
            max,
            connect_timeout,
            idle: Mutex::new(idle),
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            permits: Arc::new(Semaphore::new(max)),
            in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            force_closed: AtomicBool::new(false),
        }))
    }

    fn idle(&self) -> MutexGuard<'_, Vec<BackendConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> MutexGuard<'_, HashMap<u64, ShutdownHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check out a connection, reusing an idle one when available.
    ///
    /// Waits up to the connect timeout for a free slot.
    pub async fn checkout(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match tokio::time::timeout(self.connect_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is only closed by `close`.
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                return Err(PoolError::Exhausted {
                    address: self.upstream.address.clone(),
                    max: self.max,
                })
            }
        };

        // Counted from here on so that a concurrent close waits for us; the
        // guard undoes it on every early return.
        self.in_use.fetch_add(1, Ordering::SeqCst);
        let mut guard = PooledConnection {
            conn: None,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pool: Arc::clone(self),
            _permit: permit,
        };

        let reused = self.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => BackendConnection::open(&self.upstream, self.connect_timeout).await?,
        };

        // Close started while dialing.
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let registered = {
            let mut active = self.active();
            let open = !self.force_closed.load(Ordering::SeqCst);
            if open {
                active.insert(guard.id, conn.shutdown_handle());
            }
            open
        };
        if !registered {
            return Err(PoolError::Closed);
        }

        guard.conn = Some(conn);
        Ok(guard)
    }

    fn checkin(&self, conn: BackendConnection) {
        let mut idle = self.idle();
        // Checked under the idle lock so a concurrent close cannot miss it.
        if self.is_closed() || conn.is_broken() {
            drop(idle);
            drop(conn);
        } else {
            idle.push(conn);
        }
    }

    /// Close the pool and wait up to `grace` for checkouts to come back.
    ///
    /// New checkouts are refused at once; existing ones keep working until
    /// they are returned or the grace period expires. After that their
    /// sockets are shut down and the guards report [`PoolError::Closed`].
    /// A second close returns [`PoolError::Closed`].
    pub async fn close(&self, grace: Duration) -> Result<(), PoolError> {
        let drained = {
            let mut idle = self.idle();
            if self.closed.swap(true, Ordering::SeqCst) {
                return Err(PoolError::Closed);
            }
            std::mem::take(&mut *idle)
        };
        self.permits.close();
        let dropped = drained.len();
        drop(drained);

        let drain = async {
            while self.in_use.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            let outstanding: Vec<ShutdownHandle> = {
                let mut active = self.active();
                self.force_closed.store(true, Ordering::SeqCst);
                active.drain().map(|(_, socket)| socket).collect()
            };
            tracing::warn!(
                upstream = %self.upstream.name,
                outstanding = outstanding.len(),
                "Grace period expired, force-closing checked out connections"
            );
            for socket in outstanding {
                socket.shutdown();
            }
        }

        tracing::debug!(upstream = %self.upstream.name, idle_closed = dropped, "Connection pool closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle().len(),
            in_use: self.in_use.load(Ordering::SeqCst),
            max: self.max,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max
    }
}

/// A checked-out connection. Returns to the pool when dropped.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<BackendConnection>,
    id: u64,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The connection, or [`PoolError::Closed`] once the pool has been
    /// force-closed.
    pub fn get(&mut self) -> Result<&mut BackendConnection, PoolError> {
        if self.pool.force_closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        self.conn.as_mut().ok_or(PoolError::Closed)
    }

    /// Send a command expecting a status reply.
    pub async fn command(&mut self, args: &[&str]) -> Result<String, PoolError> {
        self.get()?.command(args).await
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.active().remove(&self.id);
        if let Some(conn) = self.conn.take() {
            self.pool.checkin(conn);
        }
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}
