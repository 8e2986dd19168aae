//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Record {
    accepted: Arc<AtomicUsize>,
    disconnected: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
}

/// A mock Redis backend that answers `PING` with `+PONG` and every other
/// command with `+OK`.
pub struct MockBackend {
    pub addr: SocketAddr,
    record: Record,
}

impl MockBackend {
    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.record.accepted.load(Ordering::SeqCst)
    }

    /// Connections that reached EOF so far.
    pub fn disconnected(&self) -> usize {
        self.record.disconnected.load(Ordering::SeqCst)
    }

    /// Every command received, command name uppercased.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.record.commands.lock().unwrap().clone()
    }
}

/// Start a mock backend on an ephemeral port.
pub async fn start_mock_backend() -> MockBackend {
    start_mock_backend_at("127.0.0.1:0".parse().unwrap()).await
}

/// Start a mock backend on `addr`.
pub async fn start_mock_backend_at(addr: SocketAddr) -> MockBackend {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let record = Record::default();
    let shared = record.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    shared.accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_redis(socket, shared.clone()));
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, record }
}

async fn serve_redis(socket: tokio::net::TcpStream, record: Record) {
    let mut reader = BufReader::new(socket);
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
            record.disconnected.fetch_add(1, Ordering::SeqCst);
            return;
        }
        let argc: usize = header.trim_start_matches('*').trim().parse().unwrap_or(0);

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            let mut len_line = String::new();
            if reader.read_line(&mut len_line).await.unwrap_or(0) == 0 {
                return;
            }
            let len: usize = len_line.trim_start_matches('$').trim().parse().unwrap_or(0);
            let mut arg = vec![0u8; len + 2];
            if reader.read_exact(&mut arg).await.is_err() {
                return;
            }
            arg.truncate(len);
            args.push(String::from_utf8_lossy(&arg).into_owned());
        }
        if let Some(name) = args.first_mut() {
            *name = name.to_uppercase();
        }
        record.commands.lock().unwrap().push(args.clone());

        let reply: &[u8] = match args.first().map(String::as_str) {
            Some("PING") => b"+PONG\r\n",
            _ => b"+OK\r\n",
        };
        if reader.get_mut().write_all(reply).await.is_err() {
            return;
        }
    }
}

/// An address nothing listens on.
pub fn unreachable_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Start a minimal HTTP server that serves `body()` for every request.
pub async fn start_config_server<F>(body: F) -> SocketAddr
where
    F: Fn() -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = body.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let payload = body();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            payload.len(),
                            payload
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// JSON document with one upstream per `(name, address)` pair.
pub fn document(upstreams: &[(&str, SocketAddr)]) -> String {
    let entries: Vec<String> = upstreams
        .iter()
        .map(|(name, addr)| {
            format!(
                r#"{{"name":"{}","address":"{}","minPoolSize":1,"maxPoolSize":5,"readTimeout":"1s","writeTimeout":"1s"}}"#,
                name, addr
            )
        })
        .collect();
    format!(r#"{{"level":"debug","upstreams":[{}]}}"#, entries.join(","))
}

/// Overwrite `path` with `contents`.
pub fn write_file(path: &std::path::Path, contents: &str) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
