//! RTMP ingest and publish engine with MPEG-TS packetization.
//!
//! The server side accepts publishes from phone and desktop encoders,
//! depacketizes H.264/H.265 and AAC into timed sample buffers and hands
//! them to an application callback. The client side publishes live
//! audio, video and metadata to a remote server, with Adobe style
//! connect authentication. The MPEG-TS layer converts between RTMP
//! payloads and the elementary stream form a capture pipeline speaks.
//!
//! # Ingesting a stream
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmpts::media::VideoSampleBuffer;
//! use rtmpts::{RtmpServer, RtmpServerHandler, ServerConfig};
//!
//! struct Ingest;
//!
//! #[async_trait::async_trait]
//! impl RtmpServerHandler for Ingest {
//!     async fn on_publish_start(&self, stream_key: &str) {
//!         println!("publishing: {stream_key}");
//!     }
//!
//!     async fn on_video_buffer(&self, _stream_key: &str, sample_buffer: VideoSampleBuffer) {
//!         println!("video frame, {} bytes", sample_buffer.data.len());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rtmpts::Result<()> {
//!     let config = ServerConfig::bind("0.0.0.0:1935")?;
//!     RtmpServer::new(config, Arc::new(Ingest)).run().await
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod media;
pub mod mpegts;
pub mod protocol;
pub mod server;
pub mod stats;

pub use client::{ClientConfig, RtmpConnection, RtmpEvent, RtmpStream};
pub use error::{Error, Result};
pub use server::{RtmpServer, RtmpServerHandler, ServerConfig};
