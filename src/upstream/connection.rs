//! A single backend connection.
//!
//! # Responsibilities
//! - Dial the backend with a connect deadline
//! - Select the configured database on open
//! - Enforce read/write timeouts on the short commands the pool issues itself
//! - Remember whether the socket is still trustworthy
//! - Hand out a [`ShutdownHandle`] so the pool can cut a checked-out socket

use std::future::Future;
use std::net::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::Upstream;
use crate::upstream::error::PoolError;

/// Run `fut` under `limit`; a zero limit means no deadline.
async fn with_deadline<T, F>(
    limit: Duration,
    address: &str,
    op: &'static str,
    fut: F,
) -> Result<T, PoolError>
where
    F: Future<Output = Result<T, PoolError>>,
{
    if limit.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(PoolError::Timeout {
            address: address.to_string(),
            op,
        }),
    }
}

/// Encode a command as a RESP array of bulk strings.
fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Shuts the underlying socket down in both directions, independently of
/// whoever owns the [`BackendConnection`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<std::net::TcpStream>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if let Err(e) = self.0.shutdown(Shutdown::Both) {
            tracing::trace!(error = %e, "Backend socket already shut down");
        }
    }
}

/// An open connection to one backend.
#[derive(Debug)]
pub struct BackendConnection {
    io: BufReader<TcpStream>,
    shutdown: ShutdownHandle,
    address: String,
    read_timeout: Duration,
    write_timeout: Duration,
    broken: bool,
}

impl BackendConnection {
    /// Dial `upstream.address` and select its database.
    pub async fn open(upstream: &Upstream, connect_timeout: Duration) -> Result<Self, PoolError> {
        let address = upstream.address.clone();
        let stream = with_deadline(connect_timeout, &address, "connect", async {
            TcpStream::connect(&upstream.address)
                .await
                .map_err(|source| PoolError::Connect {
                    address: upstream.address.clone(),
                    source,
                })
        })
        .await?;
        stream.set_nodelay(true)?;

        // A duplicate descriptor of the same socket; shutting it down ends
        // the tokio side too.
        let std_stream = stream.into_std()?;
        let shutdown = ShutdownHandle(Arc::new(std_stream.try_clone()?));
        let stream = TcpStream::from_std(std_stream)?;

        let mut conn = Self {
            io: BufReader::new(stream),
            shutdown,
            address,
            read_timeout: upstream.read_timeout,
            write_timeout: upstream.write_timeout,
            broken: false,
        };

        if upstream.database > 0 {
            let db = upstream.database.to_string();
            let reply = conn.command(&["SELECT", &db]).await?;
            if reply != "OK" {
                return Err(PoolError::Protocol(format!("SELECT {}: {}", db, reply)));
            }
        }

        tracing::trace!(address = %conn.address, database = upstream.database, "Backend connection opened");
        Ok(conn)
    }

    /// Send a command and read a single status reply (`+...`).
    ///
    /// An error reply (`-...`) or any other reply type is a protocol error.
    /// Any failure leaves the stream in an unknown state, so it also marks the
    /// connection broken.
    pub async fn command(&mut self, args: &[&str]) -> Result<String, PoolError> {
        let res = self.round_trip(args).await;
        if res.is_err() {
            self.broken = true;
        }
        res
    }

    async fn round_trip(&mut self, args: &[&str]) -> Result<String, PoolError> {
        let frame = encode_command(args);
        let (write_limit, read_limit) = (self.write_timeout, self.read_timeout);
        let address = self.address.clone();

        with_deadline(write_limit, &address, "write", async {
            self.io.get_mut().write_all(&frame).await?;
            Ok::<(), PoolError>(())
        })
        .await?;

        let mut line = String::new();
        with_deadline(read_limit, &address, "read", async {
            let n = self.io.read_line(&mut line).await?;
            if n == 0 {
                return Err(PoolError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            Ok::<(), PoolError>(())
        })
        .await?;

        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(text) = line.strip_prefix('+') {
            Ok(text.to_string())
        } else if let Some(err) = line.strip_prefix('-') {
            Err(PoolError::Protocol(err.to_string()))
        } else {
            Err(PoolError::Protocol(format!("unexpected reply {:?}", line)))
        }
    }

    /// Raw duplex stream for the request-forwarding path.
    pub fn io_mut(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.io
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Flag the connection so the pool discards it on checkin.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}
