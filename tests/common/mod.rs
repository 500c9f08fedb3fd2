//! Shared utilities for UDP integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use udp_proxy::config::loader::parse_config;
use udp_proxy::{ProxyConfig, ServerHandle, Shutdown, UdpServer};

/// How long a query waits for a reply that is expected to arrive.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a query waits before concluding the proxy dropped it.
pub const DROP_TIMEOUT: Duration = Duration::from_millis(500);

/// Start a whoami backend: answers `WHO` with its name, echoes anything else.
pub async fn start_whoami(name: &'static str) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let reply = if &buf[..n] == b"WHO" {
                format!("Hostname: {name}").into_bytes()
            } else {
                buf[..n].to_vec()
            };
            let _ = socket.send_to(&reply, peer).await;
        }
    });

    addr
}

/// Ask who answers at `addr` from a fresh client socket, i.e. a new flow.
pub async fn guess_who(addr: SocketAddr, timeout: Duration) -> io::Result<String> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    guess_who_from(&socket, addr, timeout).await
}

/// Ask who answers at `addr` from an existing client socket.
pub async fn guess_who_from(
    socket: &UdpSocket,
    addr: SocketAddr,
    timeout: Duration,
) -> io::Result<String> {
    socket.send_to(b"WHO", addr).await?;

    let mut buf = [0u8; 2048];
    match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) => Ok(String::from_utf8_lossy(&buf[..n]).into_owned()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
    }
}

/// A running proxy with its control handles.
pub struct Proxy {
    pub handle: ServerHandle,
    pub config: ProxyConfig,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl Proxy {
    /// Start a proxy from TOML configuration text.
    pub async fn start(toml: &str) -> Self {
        let config = parse_config(toml, "toml").unwrap();
        let server = UdpServer::bind(&config).await;
        let handle = server.handle();

        let (updates, rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(server.run(rx, shutdown.subscribe()));

        Self {
            handle,
            config,
            updates,
            shutdown,
            task,
        }
    }

    /// Bound address of an entry point.
    pub fn addr(&self, entry_point: &str) -> SocketAddr {
        self.handle.local_addr(entry_point).unwrap()
    }

    /// Replace the routing graph with the one in `toml`.
    pub fn reload(&self, toml: &str) {
        let config = parse_config(toml, "toml").unwrap();
        self.handle.apply(config.udp);
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("proxy did not stop")
            .unwrap();
    }
}
