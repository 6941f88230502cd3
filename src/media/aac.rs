//! AAC decoder configuration and ADTS framing.
//!
//! Publishers send one AudioSpecificConfig as the RTMP sequence header
//! and raw AAC frames after it. MPEG-TS wants each frame wrapped in a
//! 7-byte ADTS header carrying the same configuration, so this module
//! parses the config once and stamps headers from it, and reads them
//! back off the wire.

use crate::error::{MediaError, Result};

/// Size in bytes of an ADTS header without CRC.
pub const ADTS_HEADER_SIZE: usize = 7;

/// ISO 14496-3 sampling frequency table.
const fn sample_rate_for(index: u8) -> u32 {
    match index {
        0 => 96000,
        1 => 88200,
        2 => 64000,
        3 => 48000,
        4 => 44100,
        5 => 32000,
        6 => 24000,
        7 => 22050,
        8 => 16000,
        9 => 12000,
        10 => 11025,
        11 => 8000,
        12 => 7350,
        _ => 0,
    }
}

/// Decoder configuration from the RTMP audio sequence header.
///
/// ```text
/// audioObjectType           5 bits
/// samplingFrequencyIndex    4 bits
/// [samplingFrequency       24 bits, only when the index is 15]
/// channelConfiguration      4 bits
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type, 2 for AAC-LC
    pub audio_object_type: u8,
    /// Index into the standard frequency table, 15 for explicit
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// 1 mono, 2 stereo, up to 7
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacConfig.into());
        }

        let packed = u16::from_be_bytes([data[0], data[1]]);
        let audio_object_type = (packed >> 11) as u8;
        let sampling_frequency_index = ((packed >> 7) & 0x0F) as u8;

        // Index 15 inserts a 24-bit frequency before the channel field
        if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacConfig.into());
            }
            let sampling_frequency = (u32::from(data[1] & 0x7F) << 17)
                | (u32::from(data[2]) << 9)
                | (u32::from(data[3]) << 1)
                | (u32::from(data[4]) >> 7);
            return Ok(Self {
                audio_object_type,
                sampling_frequency_index,
                sampling_frequency,
                channel_configuration: (data[4] >> 3) & 0x0F,
            });
        }

        Ok(Self {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency: sample_rate_for(sampling_frequency_index),
            channel_configuration: ((packed >> 3) & 0x0F) as u8,
        })
    }

    /// Stamp the ADTS header framing a raw AAC payload of the given size.
    ///
    /// MPEG-4 ID, no CRC, one frame per header, buffer fullness pinned
    /// to the VBR marker.
    pub fn make_adts_header(&self, payload_length: usize) -> [u8; ADTS_HEADER_SIZE] {
        // ADTS profile counts from zero where the object type counts from one
        let profile = u64::from(self.audio_object_type.saturating_sub(1) & 0x03);
        let freq = u64::from(self.sampling_frequency_index & 0x0F);
        let chan = u64::from(self.channel_configuration & 0x07);
        let frame_length = ((payload_length + ADTS_HEADER_SIZE) as u64) & 0x1FFF;

        let word: u64 = (0xFFF << 44) // syncword
            | (1 << 40)               // protection absent
            | (profile << 38)
            | (freq << 34)
            | (chan << 30)
            | (frame_length << 13)
            | (0x7FF << 2); // buffer fullness, VBR

        let mut header = [0u8; ADTS_HEADER_SIZE];
        header.copy_from_slice(&word.to_be_bytes()[1..]);
        header
    }
}

/// Fixed ADTS header fields read back off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// ADTS profile (audio object type minus one)
    pub profile: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Channel configuration
    pub channel_configuration: u8,
    /// Frame length including the header itself
    pub frame_length: u16,
    /// True when no CRC follows the fixed header
    pub protection_absent: bool,
}

impl AdtsHeader {
    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADTS_HEADER_SIZE {
            return Err(MediaError::InvalidAdtsFrame.into());
        }
        if data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
            return Err(MediaError::InvalidAdtsFrame.into());
        }

        let fixed = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);

        Ok(Self {
            profile: (fixed >> 30) as u8,
            sampling_frequency_index: ((fixed >> 26) & 0x0F) as u8,
            channel_configuration: ((fixed >> 22) & 0x07) as u8,
            frame_length: ((fixed >> 5) & 0x1FFF) as u16,
            protection_absent: (data[1] & 0x01) != 0,
        })
    }

    /// Header size in bytes, accounting for the optional CRC.
    pub fn size(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + 2
        }
    }
}

/// Iterator over the payload sizes of consecutive ADTS frames.
///
/// Stops at the first malformed or truncated frame.
pub struct AdtsReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> AdtsReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }
}

impl<'a> Iterator for AdtsReader<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.cursor..];
        let header = AdtsHeader::parse(rest).ok()?;
        let frame_length = header.frame_length as usize;
        if frame_length <= header.size() || frame_length > rest.len() {
            return None;
        }
        self.cursor += frame_length;
        Some(frame_length - header.size())
    }
}
