//! Configuration schema definitions.
//!
//! A [`Config`] is one immutable snapshot of the configuration document.
//! All types derive Serde traits; document keys are camelCase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default interval between two fetches of the configuration document.
pub const DEFAULT_POLL_INTERVAL_STR: &str = "30s";

/// Root configuration snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Human-readable log output instead of JSON.
    pub pretty: bool,

    /// Metrics endpoint (`host:port`).
    pub statsd: String,

    /// Minimum log severity.
    pub level: LogLevel,

    /// Local front-ends.
    pub listeners: Vec<Listener>,

    /// Backend targets.
    pub upstreams: Vec<Upstream>,
}

impl Config {
    /// Find an upstream definition by name.
    pub fn upstream(&self, name: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.name == name)
    }

    /// Find a listener definition by name.
    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.name == name)
    }
}

/// Log severity accepted in the document and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Socket family a listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Unix,
    Tcp,
}

/// Traffic mirroring settings of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Mirroring {
    /// Upstream name receiving a copy of the traffic; empty when disabled.
    pub target: String,
}

impl Mirroring {
    pub fn is_enabled(&self) -> bool {
        !self.target.is_empty()
    }
}

/// Listener (front-end) definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub network: Network,
    pub local_socket_prefix: String,
    pub local_socket_suffix: String,

    /// Name of the upstream this listener routes to.
    pub target: String,

    pub max_subscriptions: u32,
    pub max_blockers: u32,

    /// Remove a stale socket file before binding.
    pub unlink: bool,

    pub mirroring: Mirroring,
}

impl Listener {
    /// Local bind path: `<prefix><name><suffix>`.
    pub fn bind_path(&self) -> String {
        format!(
            "{}{}{}",
            self.local_socket_prefix, self.name, self.local_socket_suffix
        )
    }
}

/// Upstream (backend) definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Upstream {
    /// Unique upstream identifier.
    pub name: String,

    /// Backend address in `host:port` form, unique across upstreams.
    pub address: String,

    /// Database index selected on every pooled connection.
    pub database: u32,

    /// Maximum pooled connections; 0 selects the pool default.
    pub max_pool_size: usize,

    /// Connections opened eagerly when the pool is created.
    pub min_pool_size: usize,

    #[serde(with = "crate::config::duration")]
    pub read_timeout: Duration,

    #[serde(with = "crate::config::duration")]
    pub write_timeout: Duration,

    pub readonly: bool,
}

impl Upstream {
    /// Convenience constructor used by tests and tooling.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Process options, normally built from command-line flags.
///
/// `pretty`, `statsd` and `level` seed the snapshot; values present in the
/// document override them.
#[derive(Debug, Clone)]
pub struct Options {
    /// Document locator (path, `file://` or `http(s)://` URL).
    pub url: String,
    pub poll_interval: Duration,
    pub pretty: bool,
    pub statsd: String,
    pub level: LogLevel,
}

impl Options {
    pub fn new(url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            url: url.into(),
            poll_interval,
            pretty: false,
            statsd: String::new(),
            level: LogLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_document() {
        let doc = r#"{
            "pretty": true,
            "statsd": "127.0.0.1:8125",
            "level": "debug",
            "listeners": [{
                "name": "cache-a",
                "network": "unix",
                "localSocketPrefix": "/var/tmp/redis-",
                "localSocketSuffix": ".sock",
                "target": "cache-a",
                "maxSubscriptions": 1,
                "maxBlockers": 2,
                "unlink": true,
                "mirroring": {"target": "cache-b"}
            }],
            "upstreams": [{
                "name": "cache-a",
                "address": "127.0.0.1:7000",
                "database": 3,
                "maxPoolSize": 5,
                "minPoolSize": 1,
                "readTimeout": "1s",
                "writeTimeout": "250ms",
                "readonly": true
            }]
        }"#;

        let cfg: Config = serde_json::from_str(doc).unwrap();
        assert!(cfg.pretty);
        assert_eq!(cfg.level, LogLevel::Debug);

        let l = cfg.listener("cache-a").unwrap();
        assert_eq!(l.bind_path(), "/var/tmp/redis-cache-a.sock");
        assert_eq!(l.max_blockers, 2);
        assert!(l.mirroring.is_enabled());

        let u = cfg.upstream("cache-a").unwrap();
        assert_eq!(u.database, 3);
        assert_eq!(u.max_pool_size, 5);
        assert_eq!(u.read_timeout, Duration::from_secs(1));
        assert_eq!(u.write_timeout, Duration::from_millis(250));
        assert!(u.readonly);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"upstreams":[{"name":"a"}]}"#).unwrap();
        assert_eq!(cfg.level, LogLevel::Info);
        assert!(cfg.listeners.is_empty());
        let u = &cfg.upstreams[0];
        assert_eq!(u.read_timeout, Duration::ZERO);
        assert_eq!(u.min_pool_size, 0);
    }

    #[test]
    fn log_level_from_str() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
