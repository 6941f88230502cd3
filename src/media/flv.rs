//! FLV tag headers carried in RTMP audio/video messages
//!
//! Video Tag Structure (legacy):
//! ```text
//! +----------+----------+----------------+-----------------+
//! |FrameType | CodecID  | AVCPacketType  | CompositionTime | Data
//! | (4 bits) | (4 bits) | (1 byte)       | (3 bytes, SI24) |
//! +----------+----------+----------------+-----------------+
//! ```
//!
//! When the high bit of the first byte is set the tag uses the enhanced
//! layout instead: packet type in the low nibble, then a FOURCC
//! (`avc1`/`hvc1`) selecting the codec.
//!
//! Audio Tag Structure:
//! ```text
//! +-----------+---------+---------+---------+---------+
//! |SoundFormat|SoundRate|SoundSize|SoundType| AACType | Data
//! | (4 bits)  | (2 bits)| (1 bit) | (1 bit) | (1 byte)|
//! +-----------+---------+---------+---------+---------+
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// Video codec selected by a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
    Hevc,
}

/// Payload variants of a video tag
#[derive(Debug, Clone)]
pub enum VideoTagBody {
    /// Decoder configuration record (avcC or hvcC)
    SequenceHeader(Bytes),
    /// Coded frame data, length-prefixed NAL units
    Frame { composition_time: i32, data: Bytes },
    EndOfSequence,
}

/// One parsed video message payload
#[derive(Debug, Clone)]
pub struct VideoTag {
    pub keyframe: bool,
    pub codec: VideoCodec,
    pub body: VideoTagBody,
}

const FRAME_TYPE_KEY: u8 = 1;

// Legacy AVCVIDEOPACKET types
const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;
const AVC_END_OF_SEQUENCE: u8 = 2;

// Enhanced packet types
const EX_SEQUENCE_START: u8 = 0;
const EX_CODED_FRAMES: u8 = 1;
const EX_SEQUENCE_END: u8 = 2;
const EX_CODED_FRAMES_X: u8 = 3;

fn get_si24(data: &mut Bytes) -> i32 {
    let raw = data.get_uint(3) as i32;
    if raw & 0x80_0000 != 0 {
        raw | !0xFF_FFFF
    } else {
        raw
    }
}

impl VideoTag {
    pub fn parse(mut data: Bytes) -> Result<VideoTag> {
        if data.is_empty() {
            return Err(MediaError::InvalidVideoTag.into());
        }
        let b0 = data.get_u8();
        if b0 & 0x80 != 0 {
            Self::parse_enhanced(b0, data)
        } else {
            Self::parse_legacy(b0, data)
        }
    }

    fn parse_legacy(b0: u8, mut data: Bytes) -> Result<VideoTag> {
        let frame_type = b0 >> 4;
        let codec_id = b0 & 0x0F;
        if codec_id != 7 {
            return Err(MediaError::UnsupportedCodec(format!("video codec id {}", codec_id)).into());
        }
        if data.len() < 4 {
            return Err(MediaError::InvalidVideoTag.into());
        }
        let packet_type = data.get_u8();
        let composition_time = get_si24(&mut data);
        let body = match packet_type {
            AVC_SEQUENCE_HEADER => VideoTagBody::SequenceHeader(data),
            AVC_NALU => VideoTagBody::Frame {
                composition_time,
                data,
            },
            AVC_END_OF_SEQUENCE => VideoTagBody::EndOfSequence,
            _ => return Err(MediaError::InvalidVideoTag.into()),
        };
        Ok(VideoTag {
            keyframe: frame_type == FRAME_TYPE_KEY,
            codec: VideoCodec::Avc,
            body,
        })
    }

    fn parse_enhanced(b0: u8, mut data: Bytes) -> Result<VideoTag> {
        let frame_type = (b0 >> 4) & 0x07;
        let packet_type = b0 & 0x0F;
        if data.len() < 4 {
            return Err(MediaError::InvalidVideoTag.into());
        }
        let mut fourcc = [0u8; 4];
        data.copy_to_slice(&mut fourcc);
        let codec = match &fourcc {
            b"avc1" => VideoCodec::Avc,
            b"hvc1" => VideoCodec::Hevc,
            other => {
                return Err(MediaError::UnsupportedCodec(
                    String::from_utf8_lossy(other).into_owned(),
                )
                .into())
            }
        };
        let body = match packet_type {
            EX_SEQUENCE_START => VideoTagBody::SequenceHeader(data),
            EX_CODED_FRAMES => {
                // HEVC carries a composition-time offset here; AVC does not
                let composition_time = match codec {
                    VideoCodec::Hevc => {
                        if data.len() < 3 {
                            return Err(MediaError::InvalidVideoTag.into());
                        }
                        get_si24(&mut data)
                    }
                    VideoCodec::Avc => 0,
                };
                VideoTagBody::Frame {
                    composition_time,
                    data,
                }
            }
            EX_CODED_FRAMES_X => VideoTagBody::Frame {
                composition_time: 0,
                data,
            },
            EX_SEQUENCE_END => VideoTagBody::EndOfSequence,
            _ => return Err(MediaError::InvalidVideoTag.into()),
        };
        Ok(VideoTag {
            keyframe: frame_type == FRAME_TYPE_KEY,
            codec,
            body,
        })
    }
}

/// Payload variants of an audio tag
#[derive(Debug, Clone)]
pub enum AudioTagBody {
    /// AudioSpecificConfig bytes
    SequenceHeader(Bytes),
    /// One raw AAC frame, no ADTS header
    Frame(Bytes),
}

/// One parsed audio message payload
#[derive(Debug, Clone)]
pub struct AudioTag {
    pub body: AudioTagBody,
}

const SOUND_FORMAT_AAC: u8 = 10;

impl AudioTag {
    pub fn parse(mut data: Bytes) -> Result<AudioTag> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAudioTag.into());
        }
        let b0 = data.get_u8();
        let sound_format = b0 >> 4;
        if sound_format != SOUND_FORMAT_AAC {
            return Err(
                MediaError::UnsupportedCodec(format!("sound format {}", sound_format)).into(),
            );
        }
        let packet_type = data.get_u8();
        let body = match packet_type {
            0 => AudioTagBody::SequenceHeader(data),
            1 => AudioTagBody::Frame(data),
            _ => return Err(MediaError::InvalidAudioTag.into()),
        };
        Ok(AudioTag { body })
    }
}
