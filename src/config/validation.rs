//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Upstream names and addresses are unique within one snapshot
//! - Listener targets reference a defined upstream
//! - Validate value ranges (min pool size <= max pool size, `host:port` addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before a snapshot is published

use std::collections::HashSet;

use crate::config::schema::{Config, Upstream};

/// A single semantic problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream at index {0} has an empty name")]
    EmptyUpstreamName(usize),

    #[error("duplicate upstream name: {0}")]
    DuplicateUpstreamName(String),

    #[error("duplicate upstream address: {0}")]
    DuplicateUpstreamAddress(String),

    #[error("upstream {name}: address {address:?} is not in host:port form")]
    InvalidAddress { name: String, address: String },

    #[error("upstream {name}: minPoolSize {min} exceeds maxPoolSize {max}")]
    PoolBounds { name: String, min: usize, max: usize },

    #[error("duplicate listener name: {0}")]
    DuplicateListenerName(String),

    #[error("listener {listener}: target upstream {target:?} is not defined")]
    UnknownTarget { listener: String, target: String },
}

/// Validate a decoded configuration snapshot.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut addresses = HashSet::new();

    for (i, upstream) in config.upstreams.iter().enumerate() {
        if upstream.name.is_empty() {
            errors.push(ValidationError::EmptyUpstreamName(i));
        } else if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstreamName(upstream.name.clone()));
        }

        if !is_host_port(&upstream.address) {
            errors.push(ValidationError::InvalidAddress {
                name: upstream.name.clone(),
                address: upstream.address.clone(),
            });
        } else if !addresses.insert(upstream.address.as_str()) {
            errors.push(ValidationError::DuplicateUpstreamAddress(upstream.address.clone()));
        }

        check_pool_bounds(upstream, &mut errors);
    }

    let mut listeners = HashSet::new();
    for listener in &config.listeners {
        if !listeners.insert(listener.name.as_str()) {
            errors.push(ValidationError::DuplicateListenerName(listener.name.clone()));
        }
        if !names.contains(listener.target.as_str()) {
            errors.push(ValidationError::UnknownTarget {
                listener: listener.name.clone(),
                target: listener.target.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_pool_bounds(upstream: &Upstream, errors: &mut Vec<ValidationError>) {
    // max == 0 means "pool default", so only an explicit max bounds min
    if upstream.max_pool_size > 0 && upstream.min_pool_size > upstream.max_pool_size {
        errors.push(ValidationError::PoolBounds {
            name: upstream.name.clone(),
            min: upstream.min_pool_size,
            max: upstream.max_pool_size,
        });
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Listener;

    fn listener(name: &str, target: &str) -> Listener {
        Listener {
            name: name.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_config() {
        let config = Config {
            upstreams: vec![
                Upstream::new("a", "127.0.0.1:7000"),
                Upstream::new("b", "127.0.0.1:7001"),
            ],
            listeners: vec![listener("a", "a")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut bad_bounds = Upstream::new("c", "127.0.0.1:7002");
        bad_bounds.min_pool_size = 6;
        bad_bounds.max_pool_size = 5;

        let config = Config {
            upstreams: vec![
                Upstream::new("a", "127.0.0.1:7000"),
                Upstream::new("a", "127.0.0.1:7000"),
                bad_bounds,
                Upstream::new("d", "localhost"),
            ],
            listeners: vec![listener("l", "missing")],
            ..Default::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateUpstreamName("a".into())));
        assert!(errors.contains(&ValidationError::DuplicateUpstreamAddress(
            "127.0.0.1:7000".into()
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::PoolBounds { min: 6, max: 5, .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownTarget { .. })));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn zero_max_leaves_min_unbounded() {
        let mut u = Upstream::new("a", "127.0.0.1:7000");
        u.min_pool_size = 3;
        let config = Config {
            upstreams: vec![u],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
