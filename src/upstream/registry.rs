//! Upstream registry: live handles indexed by name and by address.
//!
//! # Responsibilities
//! - Build a handle per upstream exactly once
//! - Keep the name and address indexes consistent
//! - Replace a handle without a gap: the new pool is opened before the old
//!   one is unregistered
//! - Remove and shut down handles
//!
//! # Design Decisions
//! - Both indexes live behind one `RwLock`; writers update them together
//! - Pools are opened before the write lock is taken
//! - Duplicate names or addresses are rejected; the registered handle stays

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::Upstream;
use crate::upstream::error::RegistryError;
use crate::upstream::handle::{UpstreamHandle, DEFAULT_DRAIN_GRACE};

#[derive(Debug, Default)]
struct Indexes {
    by_name: HashMap<String, Arc<UpstreamHandle>>,
    by_address: HashMap<String, Arc<UpstreamHandle>>,
    closed: bool,
}

impl Indexes {
    fn check_vacant(&self, upstream: &Upstream) -> Result<(), RegistryError> {
        if self.closed {
            return Err(RegistryError::Closed);
        }
        if self.by_name.contains_key(&upstream.name) {
            return Err(RegistryError::DuplicateName(upstream.name.clone()));
        }
        if self.by_address.contains_key(&upstream.address) {
            return Err(RegistryError::DuplicateAddress(upstream.address.clone()));
        }
        Ok(())
    }

    /// `current` must still own its name, and `address` must be free or
    /// owned by `current`.
    fn check_replaceable(
        &self,
        current: &Arc<UpstreamHandle>,
        address: &str,
    ) -> Result<(), RegistryError> {
        if self.closed {
            return Err(RegistryError::Closed);
        }
        match self.by_name.get(current.name()) {
            Some(h) if Arc::ptr_eq(h, current) => {}
            _ => {
                return Err(RegistryError::NotFound {
                    name: current.name().to_string(),
                })
            }
        }
        match self.by_address.get(address) {
            Some(h) if !Arc::ptr_eq(h, current) => {
                Err(RegistryError::DuplicateAddress(address.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Registry of live upstream handles.
#[derive(Debug)]
pub struct UpstreamRegistry {
    indexes: RwLock<Indexes>,
    grace: Duration,
}

impl Default for UpstreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_DRAIN_GRACE)
    }

    /// Registry whose shutdown waits at most `grace` per handle for
    /// checked-out connections.
    pub fn with_grace_period(grace: Duration) -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
            grace,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a handle for `upstream` and register it under its name and address.
    ///
    /// Rejects a name or address that is already registered. On any failure
    /// nothing is registered.
    pub async fn add(&self, upstream: Upstream) -> Result<Arc<UpstreamHandle>, RegistryError> {
        self.read().check_vacant(&upstream)?;

        let name = upstream.name.clone();
        let handle = UpstreamHandle::connect(upstream)
            .await
            .map_err(|source| RegistryError::PoolInit {
                name: name.clone(),
                source,
            })?;
        let handle = Arc::new(handle);

        let rejected = {
            let mut indexes = self.write();
            match indexes.check_vacant(handle.upstream()) {
                Ok(()) => {
                    indexes.by_name.insert(name.clone(), Arc::clone(&handle));
                    indexes
                        .by_address
                        .insert(handle.address().to_string(), Arc::clone(&handle));
                    None
                }
                Err(e) => Some(e),
            }
        };

        // Lost a race with another add (or a shutdown) while connecting.
        if let Some(err) = rejected {
            if let Err(e) = handle.close_within(Duration::ZERO).await {
                tracing::warn!(upstream = %name, error = %e, "Failed to close rejected pool");
            }
            return Err(err);
        }

        tracing::info!(upstream = %name, address = %handle.address(), "Upstream added");
        Ok(handle)
    }

    /// Swap the handle registered under `upstream.name` for one built from
    /// the new definition, then close the old one.
    ///
    /// If the new pool cannot be opened the old handle stays registered.
    pub async fn replace(&self, upstream: Upstream) -> Result<Arc<UpstreamHandle>, RegistryError> {
        let current = {
            let indexes = self.read();
            let current = indexes
                .by_name
                .get(&upstream.name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound {
                    name: upstream.name.clone(),
                })?;
            indexes.check_replaceable(&current, &upstream.address)?;
            current
        };

        let name = upstream.name.clone();
        let handle = UpstreamHandle::connect(upstream)
            .await
            .map_err(|source| RegistryError::PoolInit {
                name: name.clone(),
                source,
            })?;
        let handle = Arc::new(handle);

        let rejected = {
            let mut indexes = self.write();
            match indexes.check_replaceable(&current, handle.address()) {
                Ok(()) => {
                    indexes.by_address.remove(current.address());
                    indexes.by_name.insert(name.clone(), Arc::clone(&handle));
                    indexes
                        .by_address
                        .insert(handle.address().to_string(), Arc::clone(&handle));
                    None
                }
                Err(e) => Some(e),
            }
        };

        if let Some(err) = rejected {
            if let Err(e) = handle.close_within(Duration::ZERO).await {
                tracing::warn!(upstream = %name, error = %e, "Failed to close rejected pool");
            }
            return Err(err);
        }

        tracing::info!(
            upstream = %name,
            from = %current.address(),
            to = %handle.address(),
            "Upstream replaced"
        );
        current
            .close_within(self.grace)
            .await
            .map_err(|source| RegistryError::Close {
                name: name.clone(),
                source,
            })?;
        Ok(handle)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<UpstreamHandle>> {
        self.read().by_name.get(name).cloned()
    }

    pub fn lookup_by_address(&self, address: &str) -> Option<Arc<UpstreamHandle>> {
        self.read().by_address.get(address).cloned()
    }

    /// Unregister `name` from both indexes and close its pool.
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let handle = {
            let mut indexes = self.write();
            if indexes.closed {
                return Err(RegistryError::Closed);
            }
            let handle = indexes
                .by_name
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound {
                    name: name.to_string(),
                })?;
            indexes.by_address.remove(handle.address());
            handle
        };

        tracing::info!(upstream = %name, address = %handle.address(), "Upstream removed");
        handle
            .close_within(self.grace)
            .await
            .map_err(|source| RegistryError::Close {
                name: name.to_string(),
                source,
            })
    }

    /// Registered upstream names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every registered upstream, sorted by name.
    pub fn upstreams(&self) -> Vec<Upstream> {
        let mut upstreams: Vec<Upstream> = self
            .read()
            .by_name
            .values()
            .map(|h| h.upstream().clone())
            .collect();
        upstreams.sort_by(|a, b| a.name.cmp(&b.name));
        upstreams
    }

    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Close every handle, empty both indexes, and mark the registry closed.
    ///
    /// Every handle is attempted; the first close error is returned.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        let handles: Vec<Arc<UpstreamHandle>> = {
            let mut indexes = self.write();
            indexes.closed = true;
            indexes.by_address.clear();
            indexes.by_name.drain().map(|(_, h)| h).collect()
        };

        tracing::info!(upstreams = handles.len(), "Shutting down upstreams");

        let mut first_err = None;
        for handle in handles {
            if let Err(source) = handle.close_within(self.grace).await {
                tracing::warn!(upstream = %handle.name(), error = %source, "Failed to close upstream");
                if first_err.is_none() {
                    first_err = Some(RegistryError::Close {
                        name: handle.name().to_string(),
                        source,
                    });
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lookups_return_none() {
        let registry = UpstreamRegistry::new();
        assert!(registry.lookup_by_name("nope").is_none());
        assert!(registry.lookup_by_address("127.0.0.1:1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let registry = UpstreamRegistry::new();
        registry.shutdown().await.unwrap();
        registry.shutdown().await.unwrap();
        assert!(registry.is_closed());
    }

    #[tokio::test]
    async fn add_after_shutdown_is_closed_error() {
        let registry = UpstreamRegistry::new();
        registry.shutdown().await.unwrap();

        let err = registry
            .add(Upstream::new("late", "127.0.0.1:6379"))
            .await
            .unwrap_err();
        assert!(err.is_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_is_not_found() {
        let registry = UpstreamRegistry::new();
        let err = registry.remove("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn replace_unknown_is_not_found() {
        let registry = UpstreamRegistry::new();
        let err = registry
            .replace(Upstream::new("ghost", "127.0.0.1:6379"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
        assert!(registry.upstreams().is_empty());
    }
}
