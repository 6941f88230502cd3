//! RTMP ingest server example
//!
//! Run with: cargo run --example ingest_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example ingest_server                    # binds to 0.0.0.0:1935
//!   cargo run --example ingest_server localhost          # binds to 127.0.0.1:1935
//!   cargo run --example ingest_server 127.0.0.1:1936     # binds to 127.0.0.1:1936
//!   cargo run --example ingest_server 0.0.0.0:1940       # binds to 0.0.0.0:1940
//!
//! ## Publishing (send stream)
//!
//! With OBS:
//!   Server: rtmp://localhost/live
//!   Stream Key: test_key
//!
//! With ffmpeg:
//!   ffmpeg -re -i input.mp4 -c copy -f flv rtmp://localhost/live/test_key
//!
//! ## What it does
//!
//! The server accepts publishers, depacketizes their FLV tags into decodable
//! sample buffers (length prefixed NAL units for video, ADTS frames for
//! audio) and hands them to the handler below, which just counts them.
//! Playback clients are rejected with an error status.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtmpts::media::{AudioSampleBuffer, VideoSampleBuffer};
use rtmpts::{RtmpServer, RtmpServerHandler, ServerConfig};

/// Handler that counts incoming sample buffers per process.
struct IngestHandler {
    video_buffers: AtomicU64,
    audio_buffers: AtomicU64,
    keyframes: AtomicU64,
    bytes_received: AtomicU64,
}

impl IngestHandler {
    fn new() -> Self {
        Self {
            video_buffers: AtomicU64::new(0),
            audio_buffers: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    fn print_stats(&self) {
        println!(
            "Stats: video={} audio={} keyframes={} bytes={}",
            self.video_buffers.load(Ordering::Relaxed),
            self.audio_buffers.load(Ordering::Relaxed),
            self.keyframes.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
        );
    }
}

#[async_trait::async_trait]
impl RtmpServerHandler for IngestHandler {
    async fn on_publish_start(&self, stream_key: &str) {
        println!("Publish started: {}", stream_key);
    }

    async fn on_video_buffer(&self, _stream_key: &str, sample_buffer: VideoSampleBuffer) {
        let n = self.video_buffers.fetch_add(1, Ordering::Relaxed) + 1;
        self.bytes_received
            .fetch_add(sample_buffer.data.len() as u64, Ordering::Relaxed);
        if sample_buffer.sync {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
            println!(
                "  Keyframe at {:.3}s ({} bytes)",
                sample_buffer.presentation_time_stamp.seconds(),
                sample_buffer.data.len()
            );
        }
        if n % 500 == 0 {
            self.print_stats();
        }
    }

    async fn on_audio_buffer(&self, _stream_key: &str, sample_buffer: AudioSampleBuffer) {
        self.audio_buffers.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(sample_buffer.data.len() as u64, Ordering::Relaxed);
    }

    async fn set_target_latencies(
        &self,
        stream_key: &str,
        video_target_latency: f64,
        audio_target_latency: f64,
    ) {
        println!(
            "Target latencies for {}: video={:.3}s audio={:.3}s",
            stream_key, video_target_latency, audio_target_latency
        );
    }

    async fn on_client_disconnected(&self, stream_key: &str, reason: &str) {
        if stream_key.is_empty() {
            println!("Client disconnected before publishing: {}", reason);
        } else {
            println!("Publisher {} disconnected: {}", stream_key, reason);
            self.print_stats();
        }
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:1935
/// - "localhost:1936" -> 127.0.0.1:1936
/// - "127.0.0.1" -> 127.0.0.1:1935
/// - "0.0.0.0:1935" -> 0.0.0.0:1935
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 1935;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: ingest_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:1935)");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  ingest_server                     # binds to 0.0.0.0:1935");
    eprintln!("  ingest_server localhost           # binds to 127.0.0.1:1935");
    eprintln!("  ingest_server 127.0.0.1:1936      # binds to 127.0.0.1:1936");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], 1935)),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmpts=debug".parse()?)
                .add_directive("ingest_server=info".parse()?),
        )
        .init();

    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };

    println!("Starting RTMP ingest server on {}", config.bind_addr);
    println!();
    println!("=== Publish a stream ===");
    println!("OBS:    Server: rtmp://localhost/live  Stream Key: test_key");
    println!("ffmpeg: ffmpeg -re -i input.mp4 -c copy -f flv rtmp://localhost/live/test_key");
    println!();

    let server = RtmpServer::new(config, Arc::new(IngestHandler::new()));

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
