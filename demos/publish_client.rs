//! FLV publisher - streams an FLV file to an RTMP server
//!
//! Run with: cargo run --example publish_client -- input.flv rtmp://localhost/live/test_key
//!
//! This example demonstrates:
//! - Connecting to an RTMP server as a publishing client
//! - Reading the FLV file format manually (no external libraries)
//! - Pacing delivery by tag timestamp, like ffmpeg's -re flag
//!
//! Produce a test file with:
//!   ffmpeg -i input.mp4 -c:v libx264 -c:a aac -f flv input.flv
//!
//! # FLV File Format Overview
//!
//! ```text
//! +============+==================+==============+==================+==============+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1     | Tag 2  ...   |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |              |
//! +============+==================+==============+==================+==============+
//! ```
//!
//! Each tag consists of:
//! ```text
//! +------+----------+-----------+----------+----------+------+
//! | Type | DataSize | Timestamp | TSExt    | StreamID | Data |
//! | 1B   | 3B BE    | 3B BE     | 1B       | 3B (=0)  | N B  |
//! +------+----------+-----------+----------+----------+------+
//! ```
//!
//! Tag types: 8 = audio, 9 = video, 18 = script data (metadata)

use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};

use rtmpts::amf::amf0;
use rtmpts::client::{ClientConfig, RtmpConnection, RtmpEvent, RtmpStream, RtmpUrl};

/// FLV tag types
const FLV_TAG_AUDIO: u8 = 8;
const FLV_TAG_VIDEO: u8 = 9;
const FLV_TAG_SCRIPT: u8 = 18;

/// One tag read from the file.
struct FlvTag {
    tag_type: u8,
    timestamp: u32,
    payload: Bytes,
}

/// Pulls tags out of an FLV file loaded into memory.
struct FlvReader {
    data: Bytes,
}

impl FlvReader {
    fn new(data: Vec<u8>) -> Result<Self, String> {
        let mut data = Bytes::from(data);
        if data.len() < 9 || &data[0..3] != b"FLV" {
            return Err("not an FLV file".to_string());
        }

        // DataOffset in bytes 5-8 points at the first PreviousTagSize field.
        let header_size = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
        if data.len() < header_size {
            return Err("truncated FLV header".to_string());
        }
        data.advance(header_size);

        Ok(Self { data })
    }

    fn next_tag(&mut self) -> Option<FlvTag> {
        // PreviousTagSize, then the 11 byte tag header.
        if self.data.len() < 4 + 11 {
            return None;
        }
        self.data.advance(4);

        let tag_type = self.data.get_u8();
        let size = ((self.data.get_u8() as usize) << 16)
            | ((self.data.get_u8() as usize) << 8)
            | self.data.get_u8() as usize;
        let timestamp_low = ((self.data.get_u8() as u32) << 16)
            | ((self.data.get_u8() as u32) << 8)
            | self.data.get_u8() as u32;
        let timestamp_ext = self.data.get_u8() as u32;
        self.data.advance(3); // StreamID, always 0

        if self.data.len() < size {
            return None;
        }

        Some(FlvTag {
            tag_type,
            timestamp: (timestamp_ext << 24) | timestamp_low,
            payload: self.data.split_to(size),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmpts=debug".parse()?)
                .add_directive("publish_client=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (input, url) = match (args.next(), args.next()) {
        (Some(input), Some(url)) => (input, url),
        _ => {
            eprintln!("Usage: publish_client <input.flv> <rtmp_url>");
            eprintln!("Example: publish_client input.flv rtmp://localhost/live/test_key");
            std::process::exit(1);
        }
    };

    let stream_key = match RtmpUrl::parse(&url)?.stream_key {
        Some(key) => key,
        None => {
            eprintln!("Error: URL must end with a stream key, e.g. rtmp://host/app/key");
            std::process::exit(1);
        }
    };

    let mut reader = FlvReader::new(std::fs::read(&input)?)?;

    println!("Connecting to {}", url);
    let config = ClientConfig::new(&url);
    let (connection, mut events) = RtmpConnection::connect(config).await?;

    // Print server feedback in the background
    let event_handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RtmpEvent::Status {
                    code, description, ..
                } => {
                    println!("Status: {} ({})", code, description);
                }
                RtmpEvent::Stats(sample) => {
                    println!(
                        "Sent: {} bytes, {} kbit/s",
                        sample.bytes_sent,
                        sample.send_bitrate / 1000
                    );
                }
                RtmpEvent::Disconnected => {
                    println!("Disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut stream = RtmpStream::create(&connection).await?;
    stream.publish(&stream_key).await?;
    println!("Publishing as {}", stream_key);

    let start = Instant::now();
    let mut tags = 0u64;

    while let Some(tag) = reader.next_tag() {
        // Pace by timestamp so the server sees a realtime stream
        let target = Duration::from_millis(u64::from(tag.timestamp));
        let elapsed = start.elapsed();
        if target > elapsed {
            tokio::time::sleep(target - elapsed).await;
        }

        match tag.tag_type {
            FLV_TAG_AUDIO => stream.send_audio(tag.timestamp, tag.payload).await?,
            FLV_TAG_VIDEO => stream.send_video(tag.timestamp, tag.payload).await?,
            FLV_TAG_SCRIPT => {
                // AMF0 payload: "onMetaData" followed by the metadata object
                let values = amf0::decode_all(&tag.payload)?;
                if let Some(metadata) = values.into_iter().nth(1) {
                    stream.send_metadata(metadata).await?;
                }
            }
            other => {
                tracing::debug!(tag_type = other, "Skipping unknown tag type");
            }
        }
        tags += 1;
    }

    println!("Sent {} tags in {:.1}s", tags, start.elapsed().as_secs_f64());

    stream.close().await?;
    connection.close().await;
    let _ = event_handle.await;

    Ok(())
}
