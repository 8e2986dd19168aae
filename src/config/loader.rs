//! Configuration loading: fetch, fingerprint, decode, validate.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::schema::{Config, Listener, LogLevel, Options, Upstream};
use crate::config::source::{FetchError, Source};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Content digest of a raw document, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document shape on the wire. Global scalars are optional so that process
/// options can supply them when the document does not.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    pretty: Option<bool>,
    statsd: Option<String>,
    level: Option<LogLevel>,
    #[serde(default)]
    listeners: Vec<Listener>,
    #[serde(default)]
    upstreams: Vec<Upstream>,
}

/// Decode and validate raw document bytes.
pub fn parse_config(bytes: &[u8], toml: bool, options: &Options) -> Result<Config, ConfigError> {
    let doc: Document = if toml {
        let text = std::str::from_utf8(bytes).map_err(|e| ConfigError::Parse(e.to_string()))?;
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
    } else {
        serde_json::from_slice(bytes).map_err(|e| ConfigError::Parse(e.to_string()))?
    };

    let config = Config {
        pretty: doc.pretty.unwrap_or(options.pretty),
        statsd: doc.statsd.unwrap_or_else(|| options.statsd.clone()),
        level: doc.level.unwrap_or(options.level),
        listeners: doc.listeners,
        upstreams: doc.upstreams,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Fetch the document once and return the validated snapshot with the
/// fingerprint of the exact bytes retrieved.
pub async fn read_config(
    source: &Source,
    options: &Options,
) -> Result<(Config, Fingerprint), ConfigError> {
    let bytes = source.fetch().await?;
    let fingerprint = Fingerprint::of(&bytes);
    let config = parse_config(&bytes, source.is_toml(), options)?;
    Ok((config, fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options() -> Options {
        let mut o = Options::new("unused", Duration::from_secs(1));
        o.statsd = "statsd:8125".into();
        o.level = LogLevel::Warn;
        o
    }

    #[test]
    fn fingerprint_is_stable_and_byte_sensitive() {
        let a = Fingerprint::of(br#"{"upstreams":[]}"#);
        let b = Fingerprint::of(br#"{"upstreams":[]}"#);
        let c = Fingerprint::of(br#"{"upstreams": []}"#);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn options_seed_missing_globals() {
        let cfg = parse_config(b"{}", false, &options()).unwrap();
        assert_eq!(cfg.statsd, "statsd:8125");
        assert_eq!(cfg.level, LogLevel::Warn);
        assert!(!cfg.pretty);

        let cfg = parse_config(br#"{"level":"error","pretty":true}"#, false, &options()).unwrap();
        assert_eq!(cfg.level, LogLevel::Error);
        assert!(cfg.pretty);
    }

    #[test]
    fn malformed_document_is_parse_error() {
        let err = parse_config(b"{not json", false, &options()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_document_is_validation_error() {
        let doc = br#"{"upstreams":[
            {"name":"a","address":"127.0.0.1:7000"},
            {"name":"a","address":"127.0.0.1:7001"}
        ]}"#;
        let err = parse_config(doc, false, &options()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
    }

    #[test]
    fn decodes_toml() {
        let doc = br#"
level = "debug"

[[upstreams]]
name = "cache-a"
address = "127.0.0.1:7000"
minPoolSize = 1
maxPoolSize = 5
readTimeout = "1s"
"#;
        let cfg = parse_config(doc, true, &options()).unwrap();
        assert_eq!(cfg.level, LogLevel::Debug);
        assert_eq!(cfg.upstreams[0].max_pool_size, 5);
        assert_eq!(cfg.upstreams[0].read_timeout, Duration::from_secs(1));
    }
}
