//! RTMP server listener
//!
//! Accepts publishers, assigns session ids and spawns one
//! [`RtmpServerClient`] task per connection. The client table is the
//! only shared state and is touched exactly twice per connection, when
//! it is added and when it is removed.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::stats::ServerStats;

use super::client::RtmpServerClient;
use super::config::ServerConfig;
use super::handler::RtmpServerHandler;

struct ClientTable {
    peers: HashMap<u64, SocketAddr>,
    stats: ServerStats,
}

/// An RTMP ingest server.
///
/// Media from every publisher is delivered through the shared handler,
/// keyed by the stream key that publisher used.
pub struct RtmpServer<H> {
    config: ServerConfig,
    handler: Arc<H>,
    next_session_id: AtomicU64,
    clients: Arc<Mutex<ClientTable>>,
}

impl<H: RtmpServerHandler> RtmpServer<H> {
    pub fn new(config: ServerConfig, handler: Arc<H>) -> Self {
        RtmpServer {
            config,
            handler,
            next_session_id: AtomicU64::new(1),
            clients: Arc::new(Mutex::new(ClientTable {
                peers: HashMap::new(),
                stats: ServerStats::new(),
            })),
        }
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// A snapshot of the server wide counters.
    pub fn stats(&self) -> ServerStats {
        self.table().stats.clone()
    }

    /// Binds the configured address and serves until an accept error.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(Error::Io)?;
        self.serve(listener).await
    }

    /// Like [`run`](Self::run), but stops cleanly when `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(Error::Io)?;
        tokio::select! {
            result = self.serve(listener) => result,
            _ = shutdown => {
                tracing::info!("Server shutting down");
                Ok(())
            }
        }
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "RTMP server listening");
        }
        loop {
            let (socket, peer_addr) = listener.accept().await.map_err(Error::Io)?;
            self.accept_client(socket, peer_addr);
        }
    }

    fn accept_client(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut table = self.table();
            if self.config.max_connections > 0 && table.peers.len() >= self.config.max_connections {
                tracing::warn!(peer = %peer_addr, "Connection limit reached, rejecting");
                return;
            }
            table.peers.insert(session_id, peer_addr);
            table.stats.total_connections += 1;
            table.stats.active_connections = table.peers.len() as u64;
        }
        tracing::info!(session_id, peer = %peer_addr, "Client connected");

        if let Err(error) = socket.set_nodelay(self.config.tcp_nodelay) {
            tracing::debug!(session_id, error = %error, "Failed to set TCP_NODELAY");
        }

        let client = RtmpServerClient::new(
            socket,
            peer_addr,
            session_id,
            self.config.clone(),
            Arc::clone(&self.handler),
        );
        let clients = Arc::clone(&self.clients);
        tokio::spawn(async move {
            // Outcome logging happens inside run.
            let _ = client.run().await;
            let mut table = clients.lock().unwrap_or_else(|e| e.into_inner());
            table.peers.remove(&session_id);
            table.stats.active_connections = table.peers.len() as u64;
        });
    }

    fn table(&self) -> MutexGuard<'_, ClientTable> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}
