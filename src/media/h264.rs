//! H.264/AVC configuration records.
//!
//! RTMP carries AVC video in AVCC form (length-prefixed NAL units behind
//! an `AVCDecoderConfigurationRecord`). The transport-stream side wants
//! Annex-B framing instead, so this module parses the configuration
//! record; the reframing itself lives in [`crate::media::nal`].
//!
//! Record layout, one byte each unless noted:
//! ```text
//! configurationVersion, always 1
//! AVCProfileIndication, profile_compatibility, AVCLevelIndication
//! lengthSizeMinusOne        low 2 bits
//! numOfSPS                  low 5 bits, then per set: u16 length + NAL unit
//! numOfPPS                  then per set: u16 length + NAL unit
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// Access unit delimiter declaring I slices only, with a 4-byte start code.
/// Prepended when the access unit also carries parameter sets.
pub const AUD_I: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0x10];

/// Access unit delimiter declaring I and P slices, with a 4-byte start code.
pub const AUD_I_P: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0x30];

/// AVC decoder configuration carried by the RTMP video sequence header.
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// 66 Baseline, 77 Main, 100 High
    pub profile: u8,
    /// Constraint flags for the profile
    pub compatibility: u8,
    /// Level times ten, 31 for level 3.1
    pub level: u8,
    /// Bytes in each NAL unit length prefix, normally 4
    pub nalu_length_size: u8,
    /// Sequence parameter sets, without framing
    pub sps: Vec<Bytes>,
    /// Picture parameter sets, without framing
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord.
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 7 || data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcConfig.into());
        }

        let mut config = Self {
            profile: data.get_u8(),
            compatibility: data.get_u8(),
            level: data.get_u8(),
            nalu_length_size: (data.get_u8() & 0x03) + 1,
            sps: Vec::new(),
            pps: Vec::new(),
        };

        let sps_count = (data.get_u8() & 0x1F) as usize;
        config.sps = read_parameter_sets(&mut data, sps_count)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        let pps_count = data.get_u8() as usize;
        config.pps = read_parameter_sets(&mut data, pps_count)?;

        Ok(config)
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        let length = data.get_u16() as usize;
        if data.len() < length {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        sets.push(data.copy_to_bytes(length));
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_configuration_record() {
        let record = Bytes::from_static(&[
            0x01, 0x64, 0x00, 0x1F, // version 1, High profile, level 3.1
            0xFF, // lengthSizeMinusOne 3 in the low bits
            0xE1, // one SPS follows
            0x00, 0x04, 0x67, 0x64, 0x00, 0x1F,
            0x01, // one PPS follows
            0x00, 0x03, 0x68, 0xEF, 0x38,
        ]);

        let config = AvcConfig::parse(record).unwrap();
        assert_eq!((config.profile, config.level), (100, 31));
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps, vec![Bytes::from_static(&[0x67, 0x64, 0x00, 0x1F])]);
        assert_eq!(config.pps, vec![Bytes::from_static(&[0x68, 0xEF, 0x38])]);
    }

    #[test]
    fn length_prefix_size_comes_from_low_bits() {
        let record = Bytes::from_static(&[
            0x01, 0x42, 0x00, 0x0A, 0xFE, 0xE0, 0x00, // lengthSizeMinusOne = 2, no SPS
        ]);
        let config = AvcConfig::parse(record).unwrap();
        assert_eq!(config.nalu_length_size, 3);
        assert!(config.sps.is_empty());
        assert!(config.pps.is_empty());
    }

    #[test]
    fn rejects_wrong_version_and_short_input() {
        assert!(AvcConfig::parse(Bytes::from_static(&[0x02, 0x64, 0x00, 0x1F, 0xFF, 0xE0, 0x00])).is_err());
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x64])).is_err());
    }

    #[test]
    fn rejects_truncated_parameter_set() {
        // Claims a 16-byte SPS but the record ends after 2 bytes of it
        let record = Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x10, 0x67, 0x64]);
        assert!(AvcConfig::parse(record).is_err());
    }
}
