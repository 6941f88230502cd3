//! Media handling for RTMP and MPEG-TS
//!
//! This module provides:
//! - RTMP audio/video tag parsing (legacy and enhanced framing)
//! - AVC/HEVC configuration records and NAL unit reframing
//! - AAC configuration and ADTS framing
//! - Timed sample buffers handed to the capture/playback layer

pub mod aac;
pub mod flv;
pub mod h264;
pub mod h265;
pub mod nal;
pub mod sample;
pub mod time;

pub use aac::{AudioSpecificConfig, AdtsHeader, AdtsReader};
pub use flv::{AudioTag, AudioTagBody, VideoCodec, VideoTag, VideoTagBody};
pub use h264::AvcConfig;
pub use h265::{HevcConfig, TimeCode};
pub use sample::{AudioSampleBuffer, ReceivedTiming, VideoSampleBuffer};
pub use time::MediaTime;
