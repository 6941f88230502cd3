//! RTMP client implementation
//!
//! Provides client-side RTMP for:
//! - Connecting and authenticating against media servers
//! - Publishing live audio, video and metadata

mod auth;
pub mod config;
pub mod connection;
pub mod stream;

pub use config::{ClientConfig, RtmpUrl};
pub use connection::{RtmpConnection, RtmpEvent};
pub use stream::RtmpStream;
