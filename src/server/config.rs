//! Ingest server tunables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::*;

/// Knobs for [`RtmpServer`](crate::server::RtmpServer).
///
/// The defaults suit a LAN ingest box: large chunks, generous
/// acknowledgement window, Nagle off.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: SocketAddr,

    /// Concurrent client ceiling, 0 meaning unlimited
    pub max_connections: usize,

    /// Chunk size announced to publishers in the connect response
    pub chunk_size: u32,

    /// Bytes a publisher may send between acknowledgements
    pub window_ack_size: u32,

    /// Advertised peer bandwidth
    pub peer_bandwidth: u32,

    /// Deadline for the handshake to complete
    pub handshake_timeout: Duration,

    /// Publishers silent for this long are dropped
    pub idle_timeout: Duration,

    /// Set TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// Buffered reader capacity per connection
    pub read_buffer_size: usize,

    /// Buffered writer capacity per connection
    pub write_buffer_size: usize,

    /// Playout latency target fed to the per-track synchronizer, seconds
    pub target_latency: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], RTMP_PORT)),
            max_connections: 0,
            chunk_size: SERVER_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024,
            write_buffer_size: 64 * 1024,
            target_latency: 2.0,
        }
    }
}

impl ServerConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config bound to the given address.
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address: {addr}")))?;
        Ok(Self {
            bind_addr,
            ..Default::default()
        })
    }

    /// Sets the bind address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the maximum number of concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the chunk size announced to publishers.
    pub fn with_chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(DEFAULT_CHUNK_SIZE, MAX_MESSAGE_SIZE);
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the overall playout latency target.
    pub fn with_target_latency(mut self, seconds: f64) -> Self {
        self.target_latency = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), RTMP_PORT);
        assert_eq!(config.chunk_size, SERVER_CHUNK_SIZE);
        assert_eq!(config.window_ack_size, DEFAULT_WINDOW_ACK_SIZE);
        assert_eq!(config.max_connections, 0);
        assert!((config.target_latency - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bind_parses_address() {
        let config = ServerConfig::bind("127.0.0.1:2935").unwrap();
        assert_eq!(config.bind_addr.port(), 2935);

        assert!(ServerConfig::bind("not an address").is_err());
    }

    #[test]
    fn chunk_size_is_clamped() {
        let config = ServerConfig::new().with_chunk_size(1);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn builder_methods_chain() {
        let config = ServerConfig::new()
            .with_max_connections(8)
            .with_idle_timeout(Duration::from_secs(30))
            .with_target_latency(1.5);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!((config.target_latency - 1.5).abs() < f64::EPSILON);
    }
}
