//! Dynamic configuration: periodic refetch and atomic publication.
//!
//! # Tasks
//! ```text
//! poller:  sleep(interval) → fetch → fingerprint → changed? ──mpsc(1)──▶ applier
//! applier: recv snapshot   → write lock → swap (Config, Version) → unlock
//! readers: current()       → read lock  → clone Arc
//! ```
//!
//! Fetch and parse failures in the poller are logged and skipped; the last
//! good snapshot keeps serving.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::loader::{read_config, ConfigError, Fingerprint};
use crate::config::schema::{Config, Options};
use crate::config::source::Source;
use crate::lifecycle::Shutdown;

/// Opaque, totally ordered identifier of a published snapshot
/// (milliseconds since the Unix epoch at publication).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(i64);

impl Version {
    fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// A version stamped now, strictly greater than `prev`.
    fn next_after(prev: Version) -> Self {
        let now = Self::now();
        if now > prev {
            now
        } else {
            Self(prev.0.saturating_add(1))
        }
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Published {
    config: Arc<Config>,
    version: Version,
    fingerprint: Fingerprint,
}

/// Handle to the live configuration.
///
/// Created by [`DynamicConfig::load`]; the poller and applier tasks run until
/// [`DynamicConfig::stop`] is awaited or the handle is dropped.
pub struct DynamicConfig {
    state: Arc<RwLock<Published>>,
    shutdown: Shutdown,
    poller: JoinHandle<()>,
    applier: JoinHandle<()>,
}

impl DynamicConfig {
    /// Fetch the document once, then keep polling it in the background.
    ///
    /// Fails if the first fetch or parse fails.
    pub async fn load(options: Options) -> Result<Self, ConfigError> {
        let source = Source::parse(&options.url)?;
        let (config, fingerprint) = read_config(&source, &options).await?;

        let version = Version::now();
        tracing::info!(
            source = %source,
            %version,
            %fingerprint,
            upstreams = config.upstreams.len(),
            listeners = config.listeners.len(),
            "Configuration loaded"
        );

        let state = Arc::new(RwLock::new(Published {
            config: Arc::new(config),
            version,
            fingerprint: fingerprint.clone(),
        }));

        let shutdown = Shutdown::new();
        // Only the latest snapshot matters, so one slot is enough.
        let (update_tx, update_rx) = mpsc::channel(1);

        let applier = tokio::spawn(
            apply_updates(Arc::clone(&state), update_rx, shutdown.subscribe())
                .instrument(tracing::info_span!("config_applier")),
        );
        let poller = tokio::spawn(
            poll_source(source, options, fingerprint, update_tx, shutdown.subscribe())
                .instrument(tracing::info_span!("config_poller")),
        );

        Ok(Self {
            state,
            shutdown,
            poller,
            applier,
        })
    }

    /// Shorthand for [`DynamicConfig::load`] with default process options.
    pub async fn load_from(locator: &str, poll_interval: Duration) -> Result<Self, ConfigError> {
        Self::load(Options::new(locator, poll_interval)).await
    }

    /// The latest applied snapshot and its version. Never waits on I/O.
    pub fn current(&self) -> (Arc<Config>, Version) {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&guard.config), guard.version)
    }

    pub fn version(&self) -> Version {
        self.current().1
    }

    /// Fingerprint of the document behind the current snapshot.
    pub fn fingerprint(&self) -> Fingerprint {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        guard.fingerprint.clone()
    }

    /// Signal both background tasks and wait until they have exited.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for (task, handle) in [("config_poller", self.poller), ("config_applier", self.applier)] {
            if let Err(e) = handle.await {
                tracing::error!(task, error = %e, "Config task ended abnormally");
            }
        }
        tracing::debug!("Dynamic configuration stopped");
    }
}

impl fmt::Debug for DynamicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, version) = self.current();
        f.debug_struct("DynamicConfig")
            .field("version", &version)
            .finish_non_exhaustive()
    }
}

struct Update {
    config: Config,
    fingerprint: Fingerprint,
}

async fn poll_source(
    source: Source,
    options: Options,
    mut last: Fingerprint,
    updates: mpsc::Sender<Update>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(options.poll_interval) => {}
            _ = shutdown.recv() => return,
        }

        let (config, fingerprint) = match read_config(&source, &options).await {
            Ok(read) => read,
            Err(e) => {
                tracing::error!(source = %source, error = %e, "Failed to fetch config");
                continue;
            }
        };

        if fingerprint == last {
            tracing::trace!(source = %source, "Config unchanged");
            continue;
        }

        tracing::debug!(source = %source, %fingerprint, "Config changed");
        let update = Update {
            config,
            fingerprint: fingerprint.clone(),
        };
        tokio::select! {
            sent = updates.send(update) => {
                if sent.is_err() {
                    return;
                }
                last = fingerprint;
            }
            _ = shutdown.recv() => return,
        }
    }
}

async fn apply_updates(
    state: Arc<RwLock<Published>>,
    mut updates: mpsc::Receiver<Update>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let update = tokio::select! {
            update = updates.recv() => match update {
                Some(update) => update,
                None => return,
            },
            _ = shutdown.recv() => return,
        };

        let config = Arc::new(update.config);
        let version = {
            let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
            let version = Version::next_after(guard.version);
            guard.config = config;
            guard.version = version;
            guard.fingerprint = update.fingerprint;
            version
        };

        tracing::info!(%version, "Configuration updated");
    }
}
