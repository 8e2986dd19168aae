//! Redis connection-multiplexing proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   config document ──poll──▶ DynamicConfig ──current()──▶ reconcile loop
//!   (file / http)             (poller + applier)                │
//!                                                               ▼
//!   listeners ──lookup_by_name──▶ UpstreamRegistry ──▶ UpstreamHandle ──▶ pool ──▶ backend
//! ```
//!
//! Boot order: load the document (fatal on error), install logging from the
//! snapshot, register every upstream (fatal on error), then reconcile the
//! registry on each new version until SIGINT/SIGTERM. A pass with failures is
//! retried on the next tick.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use redis_proxy::config::duration::parse_duration;
use redis_proxy::config::{DynamicConfig, LogLevel, Options, DEFAULT_POLL_INTERVAL_STR};
use redis_proxy::lifecycle::{reconcile, signals};
use redis_proxy::observability::logging::init_logging;
use redis_proxy::upstream::UpstreamRegistry;

#[derive(Parser, Debug)]
#[command(name = "redis-proxy")]
#[command(about = "Connection-multiplexing proxy for Redis backends", long_about = None)]
struct Cli {
    /// Configuration document: a path, file:// URL or http(s):// URL.
    #[arg(short, long)]
    config: String,

    /// How often the document is refetched.
    #[arg(long, default_value = DEFAULT_POLL_INTERVAL_STR, value_parser = parse_duration)]
    poll_interval: Duration,

    /// Log level used when the document does not set one.
    #[arg(long, default_value = "info")]
    level: LogLevel,

    /// Human-readable logs when the document does not say otherwise.
    #[arg(long)]
    pretty: bool,

    /// Metrics endpoint used when the document does not set one.
    #[arg(long, default_value = "")]
    statsd: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let options = Options {
        url: cli.config,
        poll_interval: cli.poll_interval,
        pretty: cli.pretty,
        statsd: cli.statsd,
        level: cli.level,
    };
    let poll_interval = options.poll_interval;

    let dynamic = DynamicConfig::load(options).await?;
    let (config, mut version) = dynamic.current();
    init_logging(config.level, config.pretty)?;

    tracing::info!(
        %version,
        upstreams = config.upstreams.len(),
        listeners = config.listeners.len(),
        "redis-proxy v0.1.0 starting"
    );

    let registry = Arc::new(UpstreamRegistry::new());
    for upstream in &config.upstreams {
        if let Err(e) = registry.add(upstream.clone()).await {
            tracing::error!(upstream = %upstream.name, error = %e, "Startup error");
            dynamic.stop().await;
            if let Err(close_err) = registry.shutdown().await {
                tracing::warn!(error = %close_err, "Failed to shut down upstreams");
            }
            return Err(e.into());
        }
    }

    for listener in &config.listeners {
        tracing::info!(
            listener = %listener.name,
            target = %listener.target,
            bind_path = %listener.bind_path(),
            "Listener configured"
        );
    }

    let terminated = signals::wait_for_termination();
    tokio::pin!(terminated);
    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(100)));
    let mut retry = false;

    loop {
        tokio::select! {
            signal = &mut terminated => {
                match signal {
                    Ok(name) => tracing::info!(signal = name, "Shutting down"),
                    Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
                }
                break;
            }
            _ = ticker.tick() => {
                let (next, next_version) = dynamic.current();
                if next_version == version && !retry {
                    continue;
                }
                let plan = reconcile::plan_against(&registry, &next);
                retry = false;
                if !plan.is_empty() {
                    let failures = reconcile::apply(&registry, plan).await;
                    tracing::info!(
                        version = %next_version,
                        upstreams = registry.len(),
                        failures,
                        "Upstreams reconciled"
                    );
                    retry = failures > 0;
                }
                version = next_version;
            }
        }
    }

    dynamic.stop().await;
    registry.shutdown().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
