//! NAL unit reframing between Annex-B and length-prefixed form.
//!
//! Elementary streams inside MPEG-TS separate NAL units with start codes
//! (`00 00 01`, usually with a leading zero byte) while RTMP and decoder
//! sample buffers use big-endian length prefixes. The helpers here convert
//! between the two framings and work for both AVC and HEVC payloads.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// 4-byte start code prepended to each NAL unit on the Annex-B side.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Location of one NAL unit payload inside an Annex-B buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaluInfo {
    pub offset: usize,
    pub len: usize,
}

/// Scan an Annex-B buffer for NAL unit boundaries.
///
/// Recognizes both 3-byte and 4-byte start codes. Returned entries cover
/// the unit payloads only, start codes excluded.
pub fn find_nal_units(data: &[u8]) -> Vec<NaluInfo> {
    let mut units: Vec<NaluInfo> = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(last) = units.last_mut() {
                let mut end = i;
                // A 4-byte start code owns its leading zero.
                if end > last.offset && data[end - 1] == 0 {
                    end -= 1;
                }
                last.len = end - last.offset;
            }
            units.push(NaluInfo {
                offset: i + 3,
                len: 0,
            });
            i += 3;
        } else {
            i += 1;
        }
    }
    if let Some(last) = units.last_mut() {
        last.len = data.len() - last.offset;
    }
    units
}

/// Rebuild the given NAL units as 4-byte length-prefixed records.
pub fn to_length_prefixed(data: &[u8], units: &[NaluInfo]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + 4 * units.len());
    for unit in units {
        let nalu = &data[unit.offset..unit.offset + unit.len];
        out.put_u32(nalu.len() as u32);
        out.put_slice(nalu);
    }
    out.freeze()
}

/// Split a length-prefixed buffer into its NAL units without copying.
pub fn split_units(data: &Bytes, nalu_length_size: u8) -> Result<Vec<Bytes>> {
    let prefix = nalu_length_size as usize;
    let mut units = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if offset + prefix > data.len() {
            return Err(MediaError::InvalidNalu.into());
        }
        let mut len = 0usize;
        for i in 0..prefix {
            len = (len << 8) | data[offset + i] as usize;
        }
        offset += prefix;
        if offset + len > data.len() {
            return Err(MediaError::InvalidNalu.into());
        }
        units.push(data.slice(offset..offset + len));
        offset += len;
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_nal_units_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0x10, // 4-byte start code
            0x00, 0x00, 0x01, 0x67, 0x64, 0x00, // 3-byte start code
            0x00, 0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB, // 4-byte start code
        ];
        let units = find_nal_units(&data);
        assert_eq!(
            units,
            vec![
                NaluInfo { offset: 4, len: 2 },
                NaluInfo { offset: 9, len: 3 },
                NaluInfo { offset: 16, len: 3 },
            ]
        );
    }

    #[test]
    fn test_to_length_prefixed() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0x10, //
            0x00, 0x00, 0x01, 0x65, 0xAA,
        ];
        let units = find_nal_units(&data);
        let prefixed = to_length_prefixed(&data, &units);
        assert_eq!(
            prefixed.as_ref(),
            &[0x00, 0x00, 0x00, 0x02, 0x09, 0x10, 0x00, 0x00, 0x00, 0x02, 0x65, 0xAA]
        );
    }

    #[test]
    fn test_split_units_roundtrip() {
        let data = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x02, 0x09, 0x10, //
            0x00, 0x00, 0x00, 0x03, 0x65, 0xAA, 0xBB,
        ]);
        let units = split_units(&data, 4).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), &[0x09, 0x10]);
        assert_eq!(units[1].as_ref(), &[0x65, 0xAA, 0xBB]);
    }

    #[test]
    fn test_split_units_overrun() {
        let data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x09, 0x65]);
        assert!(split_units(&data, 4).is_err());
    }

    #[test]
    fn test_split_units_truncated_prefix() {
        let data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x00, 0x00]);
        assert!(split_units(&data, 4).is_err());
    }
}
