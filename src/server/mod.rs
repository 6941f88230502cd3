//! RTMP ingest server
//!
//! Accepts publishing clients, reassembles their chunked messages and
//! hands reconstructed audio and video sample buffers to an
//! [`RtmpServerHandler`]. Playback is not served; play requests get an
//! error status. One task per client, shared state is limited to the
//! client table.

mod chunk_stream;
pub mod client;
pub mod config;
pub mod handler;
pub mod latency;
pub mod listener;

pub use client::RtmpServerClient;
pub use config::ServerConfig;
pub use handler::{LoggingHandler, RtmpServerHandler};
pub use latency::TargetLatenciesSynchronizer;
pub use listener::RtmpServer;
