//! Configuration document sources.
//!
//! A locator string is resolved once into a [`Source`]; every poll then
//! fetches the raw bytes fresh from it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Upper bound on a single remote fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for document retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned status {status}")]
    Status { url: Url, status: u16 },

    #[error("unsupported config source scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid config source locator: {0}")]
    InvalidLocator(String),
}

/// Where the configuration document lives.
#[derive(Debug, Clone)]
pub enum Source {
    File(PathBuf),
    Http { url: Url, client: reqwest::Client },
}

impl Source {
    /// Resolve a locator: a plain path, a `file://` URL, or an `http(s)://` URL.
    pub fn parse(locator: &str) -> Result<Self, FetchError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(FetchError::InvalidLocator(locator.to_string()));
        }

        let url = match Url::parse(locator) {
            Ok(url) => url,
            // Plain relative or absolute paths do not parse as URLs.
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Ok(Source::File(PathBuf::from(locator)));
            }
            Err(e) => return Err(FetchError::InvalidLocator(format!("{}: {}", locator, e))),
        };

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(Source::File)
                .map_err(|_| FetchError::InvalidLocator(locator.to_string())),
            "http" | "https" => {
                let client = reqwest::Client::builder()
                    .timeout(FETCH_TIMEOUT)
                    .build()
                    .map_err(|source| FetchError::Http {
                        url: url.clone(),
                        source,
                    })?;
                Ok(Source::Http { url, client })
            }
            // Windows drive letters parse as a one-letter scheme.
            s if s.len() == 1 => Ok(Source::File(PathBuf::from(locator))),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Fetch the raw document bytes.
    pub async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        match self {
            Source::File(path) => tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            }),
            Source::Http { url, client } => {
                let http_err = |source| FetchError::Http {
                    url: url.clone(),
                    source,
                };
                let response = client.get(url.clone()).send().await.map_err(http_err)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                let body = response.bytes().await.map_err(http_err)?;
                Ok(body.to_vec())
            }
        }
    }

    /// Whether the document should be decoded as TOML instead of JSON.
    pub fn is_toml(&self) -> bool {
        let path = match self {
            Source::File(path) => path.to_string_lossy().into_owned(),
            Source::Http { url, .. } => url.path().to_string(),
        };
        path.ends_with(".toml")
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Http { url, .. } => write!(f, "{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locators() {
        assert!(matches!(Source::parse("config.json").unwrap(), Source::File(_)));
        assert!(matches!(Source::parse("/etc/proxy/config.json").unwrap(), Source::File(_)));
        assert!(matches!(
            Source::parse("file:///etc/proxy/config.json").unwrap(),
            Source::File(p) if p == PathBuf::from("/etc/proxy/config.json")
        ));
        assert!(matches!(
            Source::parse("https://config.internal/proxy.json").unwrap(),
            Source::Http { .. }
        ));
    }

    #[test]
    fn rejects_unknown_scheme_and_empty() {
        assert!(matches!(
            Source::parse("s3://bucket/config.json"),
            Err(FetchError::UnsupportedScheme(s)) if s == "s3"
        ));
        assert!(matches!(Source::parse("  "), Err(FetchError::InvalidLocator(_))));
    }

    #[test]
    fn detects_toml() {
        assert!(Source::parse("proxy.toml").unwrap().is_toml());
        assert!(!Source::parse("proxy.json").unwrap().is_toml());
    }

    #[tokio::test]
    async fn missing_file_is_fetch_error() {
        let source = Source::parse("/definitely/not/here.json").unwrap();
        assert!(matches!(source.fetch().await, Err(FetchError::Io { .. })));
    }
}
