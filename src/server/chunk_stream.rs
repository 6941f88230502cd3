//! Per chunk stream state for a publishing client.
//!
//! Each chunk stream id the publisher uses gets one [`RtmpServerChunkStream`]
//! holding the running message header, the partially reassembled message
//! body and the media reconstruction state for that stream. Compressed
//! headers fill in from the running values, completed audio and video
//! messages are parsed as FLV tags and turned back into timed sample
//! buffers through the elementary stream path.

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::media::nal::split_units;
use crate::media::{
    AudioSampleBuffer, AudioSpecificConfig, AudioTag, AudioTagBody, AvcConfig, HevcConfig,
    MediaTime, ReceivedTiming, VideoCodec, VideoSampleBuffer, VideoTag, VideoTagBody,
};
use crate::mpegts::PacketizedElementaryStream;
use crate::protocol::constants::*;

/// A fully reassembled message, ready for dispatch.
#[derive(Debug)]
pub(crate) struct CompletedMessage {
    pub type_id: u8,
    pub stream_id: u32,
    pub body: Bytes,
}

/// Running header state and media reconstruction for one chunk stream id.
pub(crate) struct RtmpServerChunkStream {
    csid: u32,
    message_timestamp: u32,
    message_length: usize,
    message_type_id: u8,
    message_stream_id: u32,
    is_absolute_time_stamp: bool,
    extended_timestamp_present_in_type3: bool,
    message_body: BytesMut,

    // Media timeline in milliseconds, absolute or accumulated from deltas.
    audio_timestamp: f64,
    video_timestamp: f64,
    audio_timing: ReceivedTiming,
    video_timing: ReceivedTiming,
    audio_config: Option<AudioSpecificConfig>,
    avc_config: Option<AvcConfig>,
    hevc_config: Option<HevcConfig>,
}

impl RtmpServerChunkStream {
    pub fn new(csid: u32) -> Self {
        RtmpServerChunkStream {
            csid,
            message_timestamp: 0,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
            is_absolute_time_stamp: false,
            extended_timestamp_present_in_type3: false,
            message_body: BytesMut::new(),

            audio_timestamp: 0.0,
            video_timestamp: 0.0,
            audio_timing: ReceivedTiming::new(),
            video_timing: ReceivedTiming::new(),
            audio_config: None,
            avc_config: None,
            hevc_config: None,
        }
    }

    /// Applies a type 0 message header: absolute timestamp, length, type, stream id.
    pub fn set_type0_header(&mut self, timestamp: u32, length: usize, type_id: u8, stream_id: u32) {
        self.message_timestamp = timestamp;
        self.message_length = length;
        self.message_type_id = type_id;
        self.message_stream_id = stream_id;
        self.is_absolute_time_stamp = true;
        self.extended_timestamp_present_in_type3 = timestamp == EXTENDED_TIMESTAMP_THRESHOLD;
    }

    /// Applies a type 1 message header: timestamp delta, length and type.
    pub fn set_type1_header(&mut self, delta: u32, length: usize, type_id: u8) {
        self.message_timestamp = delta;
        self.message_length = length;
        self.message_type_id = type_id;
        self.is_absolute_time_stamp = false;
        self.extended_timestamp_present_in_type3 = delta == EXTENDED_TIMESTAMP_THRESHOLD;
    }

    /// Applies a type 2 message header: timestamp delta only.
    pub fn set_type2_header(&mut self, delta: u32) {
        self.message_timestamp = delta;
        self.is_absolute_time_stamp = false;
        self.extended_timestamp_present_in_type3 = delta == EXTENDED_TIMESTAMP_THRESHOLD;
    }

    /// True when the header just applied signalled an extended timestamp.
    pub fn timestamp_needs_extension(&self) -> bool {
        self.message_timestamp == EXTENDED_TIMESTAMP_THRESHOLD
    }

    /// True when type 3 continuation headers carry an extended timestamp.
    ///
    /// The flag persists from the last full header on this chunk stream.
    pub fn extended_timestamp_in_type3(&self) -> bool {
        self.extended_timestamp_present_in_type3
    }

    /// Replaces the 24-bit timestamp field with the extended 32-bit value.
    pub fn set_extended_timestamp(&mut self, timestamp: u32) {
        self.message_timestamp = timestamp;
    }

    /// Bytes of payload to read next, one chunk or the message remainder.
    pub fn chunk_data_size(&self, chunk_size: u32) -> usize {
        (chunk_size as usize).min(self.message_length.saturating_sub(self.message_body.len()))
    }

    /// Appends payload bytes, returning the message once fully reassembled.
    pub fn append_body(&mut self, data: &[u8]) -> Option<CompletedMessage> {
        self.message_body.extend_from_slice(data);
        if self.message_body.len() < self.message_length {
            return None;
        }
        Some(CompletedMessage {
            type_id: self.message_type_id,
            stream_id: self.message_stream_id,
            body: self.message_body.split().freeze(),
        })
    }

    /// Drops any partially reassembled body, for an abort message.
    pub fn discard_partial_body(&mut self) {
        self.message_body.clear();
    }

    /// Timestamp of the most recent audio message, milliseconds.
    pub fn audio_timestamp(&self) -> f64 {
        self.audio_timestamp
    }

    /// Timestamp of the most recent video message, milliseconds.
    pub fn video_timestamp(&self) -> f64 {
        self.video_timestamp
    }

    /// Handles a completed audio message.
    ///
    /// Sequence headers install the decoder configuration. Coded frames
    /// are wrapped in an elementary stream record and come back out as a
    /// timed sample buffer on a zero-based timeline. Frames arriving
    /// before the configuration are dropped.
    pub fn process_audio(&mut self, body: Bytes) -> Result<Option<AudioSampleBuffer>> {
        self.advance_audio_timestamp();
        let tag = AudioTag::parse(body)?;
        match tag.body {
            AudioTagBody::SequenceHeader(config) => {
                let config = AudioSpecificConfig::parse(&config)?;
                tracing::debug!(
                    csid = self.csid,
                    sample_rate = config.sampling_frequency,
                    channels = config.channel_configuration,
                    "Audio configuration received"
                );
                self.audio_config = Some(config);
                Ok(None)
            }
            AudioTagBody::Frame(frame) => {
                let Some(config) = &self.audio_config else {
                    tracing::trace!(csid = self.csid, "Audio frame before configuration");
                    return Ok(None);
                };
                let pts = MediaTime::from_millis(self.audio_timestamp as i64);
                let Some(pes) = PacketizedElementaryStream::new_audio(&frame, pts, config) else {
                    tracing::trace!(csid = self.csid, bytes = frame.len(), "Oversized audio frame");
                    return Ok(None);
                };
                Ok(pes.make_audio_sample_buffer(MediaTime::ZERO, &mut self.audio_timing))
            }
        }
    }

    /// Handles a completed video message.
    ///
    /// The RTMP timestamp is the decode timeline; the tag's composition
    /// time offsets the presentation timestamp. Configuration records are
    /// forwarded into the frame on keyframes so the reconstructed access
    /// unit is decodable from any sync point.
    pub fn process_video(&mut self, body: Bytes) -> Result<Option<VideoSampleBuffer>> {
        self.advance_video_timestamp();
        let tag = VideoTag::parse(body)?;
        match tag.body {
            VideoTagBody::SequenceHeader(record) => {
                match tag.codec {
                    VideoCodec::Avc => self.avc_config = Some(AvcConfig::parse(record)?),
                    VideoCodec::Hevc => self.hevc_config = Some(HevcConfig::parse(record)?),
                }
                tracing::debug!(csid = self.csid, codec = ?tag.codec, "Video configuration received");
                Ok(None)
            }
            VideoTagBody::Frame {
                composition_time,
                data,
            } => {
                let dts_millis = self.video_timestamp;
                let pts = MediaTime::from_millis((dts_millis + composition_time as f64) as i64);
                let dts =
                    (composition_time != 0).then(|| MediaTime::from_millis(dts_millis as i64));

                let pes = match tag.codec {
                    VideoCodec::Avc => {
                        let Some(config) = &self.avc_config else {
                            tracing::trace!(csid = self.csid, "Video frame before configuration");
                            return Ok(None);
                        };
                        let nal_units = split_units(&data, config.nalu_length_size)?;
                        PacketizedElementaryStream::new_video_avc(
                            &nal_units,
                            pts,
                            dts,
                            tag.keyframe.then_some(config),
                        )
                    }
                    VideoCodec::Hevc => {
                        let Some(config) = &self.hevc_config else {
                            tracing::trace!(csid = self.csid, "Video frame before configuration");
                            return Ok(None);
                        };
                        let nal_units = split_units(&data, config.nalu_length_size)?;
                        PacketizedElementaryStream::new_video_hevc(
                            &nal_units,
                            pts,
                            dts,
                            tag.keyframe.then_some(config),
                            None,
                        )
                    }
                };
                Ok(pes.make_video_sample_buffer(MediaTime::ZERO, &mut self.video_timing, tag.keyframe))
            }
            VideoTagBody::EndOfSequence => Ok(None),
        }
    }

    fn advance_audio_timestamp(&mut self) {
        if self.is_absolute_time_stamp {
            self.audio_timestamp = self.message_timestamp as f64;
        } else {
            self.audio_timestamp += self.message_timestamp as f64;
        }
    }

    fn advance_video_timestamp(&mut self) {
        if self.is_absolute_time_stamp {
            self.video_timestamp = self.message_timestamp as f64;
        } else {
            self.video_timestamp += self.message_timestamp as f64;
        }
    }
}
