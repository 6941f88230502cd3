//! H.265/HEVC configuration records and NAL unit types.
//!
//! Enhanced RTMP carries HEVC behind an `HEVCDecoderConfigurationRecord`
//! (hvcC box payload), which bundles VPS/SPS/PPS arrays instead of the
//! flat AVC lists. This module parses that record and builds the time
//! code SEI message spliced into transport-stream access units.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};
use crate::media::nal::START_CODE;

/// Access unit delimiter declaring any slice type, with a 4-byte start code.
pub const AUD: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50];

/// The HEVC NAL unit types this module reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HevcNaluType {
    /// Video parameter set
    Vps = 32,
    /// Sequence parameter set
    Sps = 33,
    /// Picture parameter set
    Pps = 34,
    /// Prefix supplemental enhancement information
    PrefixSei = 39,
}

/// HEVC decoder configuration (from the RTMP sequence header)
#[derive(Debug, Clone)]
pub struct HevcConfig {
    /// General profile (1=Main, 2=Main 10)
    pub profile: u8,
    /// General level (e.g., 123 = 4.1)
    pub level: u8,
    /// NALU length prefix size in bytes (usually 4)
    pub nalu_length_size: u8,
    /// Video Parameter Sets
    pub vps: Vec<Bytes>,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
}

impl HevcConfig {
    /// Parse from HEVCDecoderConfigurationRecord
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 23 {
            return Err(MediaError::InvalidHevcConfig.into());
        }

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidHevcConfig.into());
        }

        let profile = data.get_u8() & 0x1F;
        // profile compatibility + constraint indicator flags
        data.advance(4 + 6);
        let level = data.get_u8();
        // min_spatial_segmentation .. avg frame rate
        data.advance(8);
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_arrays = data.get_u8();
        let mut vps = Vec::new();
        let mut sps = Vec::new();
        let mut pps = Vec::new();
        for _ in 0..num_arrays {
            if data.len() < 3 {
                return Err(MediaError::InvalidHevcConfig.into());
            }
            let nalu_type = data.get_u8() & 0x3F;
            let num_nalus = data.get_u16() as usize;
            for _ in 0..num_nalus {
                if data.len() < 2 {
                    return Err(MediaError::InvalidHevcConfig.into());
                }
                let len = data.get_u16() as usize;
                if data.len() < len {
                    return Err(MediaError::InvalidHevcConfig.into());
                }
                let nalu = data.copy_to_bytes(len);
                match nalu_type {
                    t if t == HevcNaluType::Vps as u8 => vps.push(nalu),
                    t if t == HevcNaluType::Sps as u8 => sps.push(nalu),
                    t if t == HevcNaluType::Pps as u8 => pps.push(nalu),
                    _ => {}
                }
            }
        }

        Ok(HevcConfig {
            profile,
            level,
            nalu_length_size,
            vps,
            sps,
            pps,
        })
    }
}

/// Wall-clock position spliced into HEVC access units as a time code SEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frame: u16,
}

impl TimeCode {
    /// Encode as a prefix SEI NAL unit with a 4-byte start code.
    ///
    /// Emits a single clock timestamp with `full_timestamp_flag` set, so
    /// every field is coded explicitly.
    pub fn encode_sei(&self) -> Bytes {
        let mut bits = BitWriter::new();
        bits.write_bits(1, 2); // num_clock_ts
        bits.write_bit(true); // clock_timestamp_flag
        bits.write_bit(false); // units_field_based_flag
        bits.write_bits(0, 5); // counting_type
        bits.write_bit(true); // full_timestamp_flag
        bits.write_bit(false); // discontinuity_flag
        bits.write_bit(false); // cnt_dropped_flag
        bits.write_bits(u32::from(self.frame), 9); // n_frames
        bits.write_bits(u32::from(self.seconds), 6);
        bits.write_bits(u32::from(self.minutes), 6);
        bits.write_bits(u32::from(self.hours), 5);
        bits.write_bits(0, 5); // time_offset_length
        bits.write_bit(true); // payload alignment
        let payload = bits.into_bytes();

        let mut rbsp = Vec::with_capacity(payload.len() + 3);
        rbsp.push(136); // time_code payload type
        rbsp.push(payload.len() as u8);
        rbsp.extend_from_slice(&payload);
        rbsp.push(0x80); // rbsp stop bit

        let mut out = BytesMut::with_capacity(START_CODE.len() + 2 + rbsp.len() + 2);
        out.put_slice(&START_CODE);
        out.put_u8((HevcNaluType::PrefixSei as u8) << 1);
        out.put_u8(0x01); // layer 0, temporal id 1
        out.put_slice(&escape_emulation(&rbsp));
        out.freeze()
    }
}

/// Insert emulation prevention bytes so the RBSP cannot alias a start code.
fn escape_emulation(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    out
}

/// MSB-first bit packer for the fixed-width SEI fields.
struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_pos: 0,
        }
    }

    fn write_bit(&mut self, bit: bool) {
        if self.bit_pos == 0 {
            self.data.push(0);
        }
        if bit {
            let idx = self.data.len() - 1;
            self.data[idx] |= 1 << (7 - self.bit_pos);
        }
        self.bit_pos = (self.bit_pos + 1) % 8;
    }

    fn write_bits(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hevc_config_parse() {
        let mut data = vec![
            0x01, // version
            0x01, // profile space/tier/profile (Main)
            0x60, 0x00, 0x00, 0x00, // profile compatibility
            0x90, 0x00, 0x00, 0x00, 0x00, 0x00, // constraint flags
            0x7B, // level 4.1
            0xF0, 0x00, // min spatial segmentation
            0xFC, // parallelism
            0xFD, // chroma format
            0xF8, // bit depth luma
            0xF8, // bit depth chroma
            0x00, 0x00, // avg frame rate
            0x0F, // flags + length size = 4
            0x03, // three arrays
        ];
        for (nalu_type, payload) in [
            (0x20, &[0x40, 0x01, 0x0C][..]),
            (0x21, &[0x42, 0x01, 0x01, 0x60][..]),
            (0x22, &[0x44, 0x01, 0xC0][..]),
        ] {
            data.push(0x80 | nalu_type); // array_completeness + type
            data.extend_from_slice(&[0x00, 0x01]); // one nalu
            data.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            data.extend_from_slice(payload);
        }

        let config = HevcConfig::parse(Bytes::from(data)).unwrap();
        assert_eq!(config.profile, 1);
        assert_eq!(config.level, 123);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.vps.len(), 1);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(config.sps[0].as_ref(), &[0x42, 0x01, 0x01, 0x60]);
    }

    #[test]
    fn test_hevc_config_rejects_bad_version() {
        let data = Bytes::from(vec![0x02; 23]);
        assert!(HevcConfig::parse(data).is_err());
    }

    #[test]
    fn test_timecode_sei() {
        let timecode = TimeCode {
            hours: 12,
            minutes: 34,
            seconds: 56,
            frame: 7,
        };
        assert_eq!(
            timecode.encode_sei().as_ref(),
            &[
                0x00, 0x00, 0x00, 0x01, // start code
                0x4E, 0x01, // prefix SEI nal header
                0x88, 0x06, // payload type 136, size 6
                0x60, 0x40, 0x3F, 0x11, 0x30, 0x10, // packed time code
                0x80, // rbsp stop
            ]
        );
    }

    #[test]
    fn test_timecode_sei_escapes_zero_runs() {
        let timecode = TimeCode {
            hours: 0,
            minutes: 0,
            seconds: 0,
            frame: 0,
        };
        assert_eq!(
            timecode.encode_sei().as_ref(),
            &[
                0x00, 0x00, 0x00, 0x01, //
                0x4E, 0x01, //
                0x88, 0x06, //
                0x60, 0x40, 0x00, 0x00, 0x03, 0x00, 0x10, // escaped zero run
                0x80,
            ]
        );
    }
}
