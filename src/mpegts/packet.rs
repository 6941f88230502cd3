//! MPEG-TS transport packets
//!
//! Fixed 188-byte packets: 4-byte header, optional adaptation field,
//! payload. Short payloads are padded to the full packet size with
//! adaptation-field stuffing so every encoded packet is exactly 188
//! bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MpegTsError, Result};
use crate::mpegts::timestamp::ProgramClockReference;

/// Total packet size on the wire
pub const PACKET_SIZE: usize = 188;
/// Fixed header size
pub const HEADER_SIZE: usize = 4;
/// Payload capacity of a packet without an adaptation field
pub const MAX_PAYLOAD_SIZE: usize = PACKET_SIZE - HEADER_SIZE;

/// First byte of every transport packet
pub const SYNC_BYTE: u8 = 0x47;

/// Optional adaptation field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    pub random_access_indicator: bool,
    /// (33-bit base at 90 kHz, 9-bit extension at 27 MHz)
    pub program_clock_reference: Option<(u64, u16)>,
    /// Trailing 0xFF bytes
    pub stuffing: usize,
}

impl AdaptationField {
    pub fn new() -> Self {
        AdaptationField::default()
    }

    /// Encoded size including the length byte
    pub fn encoded_len(&self) -> usize {
        let pcr = if self.program_clock_reference.is_some() {
            6
        } else {
            0
        };
        2 + pcr + self.stuffing
    }

    fn encode(&self, buf: &mut BytesMut, extra_stuffing: usize) {
        let stuffing = self.stuffing + extra_stuffing;
        let pcr_len = if self.program_clock_reference.is_some() {
            6
        } else {
            0
        };
        buf.put_u8((1 + pcr_len + stuffing) as u8);
        let mut flags = 0u8;
        if self.random_access_indicator {
            flags |= 0x40;
        }
        if self.program_clock_reference.is_some() {
            flags |= 0x10;
        }
        buf.put_u8(flags);
        if let Some((base, extension)) = self.program_clock_reference {
            buf.put_slice(&ProgramClockReference::encode(base, extension));
        }
        for _ in 0..stuffing {
            buf.put_u8(0xFF);
        }
    }
}

/// One 188-byte transport packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsPacket {
    /// 13-bit packet identifier
    pub pid: u16,
    pub payload_unit_start_indicator: bool,
    /// 4-bit counter, maintained by the outer writer
    pub continuity_counter: u8,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Bytes,
}

impl TsPacket {
    pub fn new(pid: u16) -> Self {
        TsPacket {
            pid,
            ..Default::default()
        }
    }

    /// Payload bytes still available next to the current adaptation field
    pub fn available_payload_len(&self) -> usize {
        let af = self
            .adaptation_field
            .as_ref()
            .map(AdaptationField::encoded_len)
            .unwrap_or(0);
        MAX_PAYLOAD_SIZE - af
    }

    /// Append exactly 188 bytes to `buf`, stuffing as needed
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let af_len = self
            .adaptation_field
            .as_ref()
            .map(AdaptationField::encoded_len)
            .unwrap_or(0);
        let used = HEADER_SIZE + af_len + self.payload.len();
        if used > PACKET_SIZE {
            return Err(MpegTsError::PayloadTooLarge(self.payload.len()).into());
        }
        let deficit = PACKET_SIZE - used;

        let has_adaptation = self.adaptation_field.is_some() || deficit > 0;
        buf.put_u8(SYNC_BYTE);
        let mut b1 = ((self.pid >> 8) & 0x1F) as u8;
        if self.payload_unit_start_indicator {
            b1 |= 0x40;
        }
        buf.put_u8(b1);
        buf.put_u8((self.pid & 0xFF) as u8);
        let af_ctrl = match (has_adaptation, !self.payload.is_empty()) {
            (true, true) => 0b11,
            (true, false) => 0b10,
            (false, _) => 0b01,
        };
        buf.put_u8(af_ctrl << 4 | (self.continuity_counter & 0x0F));

        match &self.adaptation_field {
            Some(af) => af.encode(buf, deficit),
            None if deficit == 1 => buf.put_u8(0x00),
            None if deficit > 1 => {
                AdaptationField {
                    stuffing: deficit - 2,
                    ..Default::default()
                }
                .encode(buf, 0);
            }
            None => {}
        }
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Parse one packet; `bytes` must hold exactly 188 bytes
    pub fn decode(bytes: &[u8]) -> Result<TsPacket> {
        if bytes.len() != PACKET_SIZE || bytes[0] != SYNC_BYTE {
            return Err(MpegTsError::TruncatedHeader.into());
        }
        let mut buf = Bytes::copy_from_slice(bytes);
        buf.advance(1);
        let b1 = buf.get_u8();
        let pusi = b1 & 0x40 != 0;
        let pid = ((b1 as u16 & 0x1F) << 8) | buf.get_u8() as u16;
        let b3 = buf.get_u8();
        let af_ctrl = (b3 >> 4) & 0x03;
        let continuity_counter = b3 & 0x0F;

        let adaptation_field = if af_ctrl & 0b10 != 0 {
            let len = buf.get_u8() as usize;
            if len > buf.remaining() {
                return Err(MpegTsError::TruncatedHeader.into());
            }
            let mut af_bytes = buf.split_to(len);
            let mut af = AdaptationField::new();
            if len > 0 {
                let flags = af_bytes.get_u8();
                af.random_access_indicator = flags & 0x40 != 0;
                if flags & 0x10 != 0 {
                    if af_bytes.remaining() < 6 {
                        return Err(MpegTsError::TruncatedHeader.into());
                    }
                    let mut pcr = [0u8; 6];
                    af_bytes.copy_to_slice(&mut pcr);
                    af.program_clock_reference = Some(ProgramClockReference::decode(&pcr));
                }
                af.stuffing = af_bytes.remaining();
            }
            Some(af)
        } else {
            None
        };

        let payload = if af_ctrl & 0b01 != 0 {
            buf
        } else {
            Bytes::new()
        };
        Ok(TsPacket {
            pid,
            payload_unit_start_indicator: pusi,
            continuity_counter,
            adaptation_field,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(packet: &TsPacket) -> Bytes {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn test_full_payload_packet() {
        let mut packet = TsPacket::new(256);
        packet.payload = Bytes::from(vec![0xAB; MAX_PAYLOAD_SIZE]);
        let encoded = encode_one(&packet);
        assert_eq!(encoded.len(), PACKET_SIZE);
        assert_eq!(encoded[0], SYNC_BYTE);
        // Payload-only adaptation control
        assert_eq!(encoded[3] >> 4, 0b01);
    }

    #[test]
    fn test_short_payload_is_stuffed() {
        let mut packet = TsPacket::new(256);
        packet.payload = Bytes::from(vec![1, 2, 3]);
        let encoded = encode_one(&packet);
        assert_eq!(encoded.len(), PACKET_SIZE);
        assert_eq!(encoded[3] >> 4, 0b11);
        assert_eq!(&encoded[PACKET_SIZE - 3..], &[1, 2, 3]);

        let decoded = TsPacket::decode(&encoded).unwrap();
        assert_eq!(decoded.payload.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_one_byte_deficit_uses_empty_field() {
        let mut packet = TsPacket::new(0x100);
        packet.payload = Bytes::from(vec![7; MAX_PAYLOAD_SIZE - 1]);
        let encoded = encode_one(&packet);
        assert_eq!(encoded.len(), PACKET_SIZE);
        // Single zero length byte, then payload
        assert_eq!(encoded[4], 0x00);
        let decoded = TsPacket::decode(&encoded).unwrap();
        assert_eq!(decoded.payload.len(), MAX_PAYLOAD_SIZE - 1);
    }

    #[test]
    fn test_pcr_and_random_access_roundtrip() {
        let mut packet = TsPacket::new(0x1FF);
        packet.payload_unit_start_indicator = true;
        packet.adaptation_field = Some(AdaptationField {
            random_access_indicator: true,
            program_clock_reference: Some((123_456_789 & 0x1_FFFF_FFFF, 42)),
            stuffing: 0,
        });
        packet.payload = Bytes::from(vec![9; 30]);
        let encoded = encode_one(&packet);
        assert_eq!(encoded.len(), PACKET_SIZE);

        let decoded = TsPacket::decode(&encoded).unwrap();
        assert!(decoded.payload_unit_start_indicator);
        assert_eq!(decoded.pid, 0x1FF);
        let af = decoded.adaptation_field.unwrap();
        assert!(af.random_access_indicator);
        assert_eq!(af.program_clock_reference, Some((123_456_789, 42)));
        assert_eq!(decoded.payload.as_ref(), &[9u8; 30][..]);
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let mut packet = TsPacket::new(1);
        packet.payload = Bytes::from(vec![0; MAX_PAYLOAD_SIZE + 1]);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }
}
