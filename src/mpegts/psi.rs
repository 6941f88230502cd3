//! Program specific information tables.
//!
//! The program association table announces which PID carries the program
//! map, and the program map table announces the elementary stream PIDs and
//! their codecs. Both are emitted as single-section tables that fit in one
//! transport packet, sealed with a CRC-32/MPEG-2 and padded with 0xFF
//! stuffing bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::mpegts::crc32::Crc32;
use crate::mpegts::packet::{TsPacket, MAX_PAYLOAD_SIZE};

/// PID reserved for the program association table.
pub const PAT_PID: u16 = 0x0000;

/// Default PID for the program map table of the single program we mux.
pub const PMT_PID: u16 = 0x1000;

const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;

/// Elementary stream types we announce in the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// AVC video, `stream_type` 0x1B.
    H264,
    /// HEVC video, `stream_type` 0x24.
    H265,
    /// AAC audio in ADTS framing, `stream_type` 0x0F.
    AacAdts,
}

impl StreamType {
    pub fn code(&self) -> u8 {
        match self {
            StreamType::H264 => 0x1B,
            StreamType::H265 => 0x24,
            StreamType::AacAdts => 0x0F,
        }
    }
}

/// One elementary stream entry of a program map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStream {
    pub pid: u16,
    pub stream_type: StreamType,
}

/// Program association section pointing at a single program's PMT.
#[derive(Debug, Clone)]
pub struct ProgramAssociation {
    pub transport_stream_id: u16,
    pub program_number: u16,
    pub pmt_pid: u16,
}

impl Default for ProgramAssociation {
    fn default() -> Self {
        ProgramAssociation {
            transport_stream_id: 1,
            program_number: 1,
            pmt_pid: PMT_PID,
        }
    }
}

impl ProgramAssociation {
    /// Encodes the PAT section, CRC included.
    pub fn encode_section(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(9);
        body.put_u16(self.transport_stream_id);
        body.put_u8(0xC1); // version 0, current_next_indicator set
        body.put_u8(0x00); // section_number
        body.put_u8(0x00); // last_section_number
        body.put_u16(self.program_number);
        body.put_u16(0xE000 | (self.pmt_pid & 0x1FFF));
        finish_section(TABLE_ID_PAT, &body)
    }

    /// Packs the section into a full transport packet on the PAT PID.
    pub fn packet(&self, continuity_counter: u8) -> TsPacket {
        section_packet(PAT_PID, continuity_counter, &self.encode_section())
    }
}

/// Program map section listing the elementary streams of one program.
#[derive(Debug, Clone)]
pub struct ProgramMap {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub streams: Vec<ElementaryStream>,
}

impl ProgramMap {
    pub fn new(program_number: u16, pcr_pid: u16) -> Self {
        ProgramMap {
            program_number,
            pcr_pid,
            streams: Vec::new(),
        }
    }

    /// Encodes the PMT section, CRC included.
    pub fn encode_section(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(9 + self.streams.len() * 5);
        body.put_u16(self.program_number);
        body.put_u8(0xC1); // version 0, current_next_indicator set
        body.put_u8(0x00); // section_number
        body.put_u8(0x00); // last_section_number
        body.put_u16(0xE000 | (self.pcr_pid & 0x1FFF));
        body.put_u16(0xF000); // no program descriptors
        for stream in &self.streams {
            body.put_u8(stream.stream_type.code());
            body.put_u16(0xE000 | (stream.pid & 0x1FFF));
            body.put_u16(0xF000); // no ES descriptors
        }
        finish_section(TABLE_ID_PMT, &body)
    }

    /// Packs the section into a full transport packet on the given PMT PID.
    pub fn packet(&self, pmt_pid: u16, continuity_counter: u8) -> TsPacket {
        section_packet(pmt_pid, continuity_counter, &self.encode_section())
    }
}

/// Wraps a section body in the long-form section header and trailing CRC.
///
/// `section_length` counts everything after the length field, CRC included.
fn finish_section(table_id: u8, body: &[u8]) -> Bytes {
    let mut section = BytesMut::with_capacity(3 + body.len() + 4);
    section.put_u8(table_id);
    let section_length = body.len() + 4;
    section.put_u8(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    section.put_u8(section_length as u8);
    section.put_slice(body);
    let crc = Crc32::MPEG2.calculate(&section);
    section.put_u32(crc);
    section.freeze()
}

/// Builds a payload-only transport packet carrying one PSI section.
///
/// The payload starts with a zero pointer field and is filled to capacity
/// with 0xFF stuffing after the section.
fn section_packet(pid: u16, continuity_counter: u8, section: &[u8]) -> TsPacket {
    let mut payload = BytesMut::with_capacity(MAX_PAYLOAD_SIZE);
    payload.put_u8(0x00); // pointer field
    payload.put_slice(section);
    payload.resize(MAX_PAYLOAD_SIZE, 0xFF);
    TsPacket {
        pid,
        payload_unit_start_indicator: true,
        continuity_counter,
        adaptation_field: None,
        payload: payload.freeze(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::packet::PACKET_SIZE;
    use bytes::BytesMut;

    #[test]
    fn pat_section_layout() {
        let pat = ProgramAssociation::default();
        let section = pat.encode_section();

        assert_eq!(section[0], TABLE_ID_PAT);
        // 9 body bytes plus the CRC.
        assert_eq!(section[1], 0xB0);
        assert_eq!(section[2], 13);
        assert_eq!(section.len(), 16);
        // transport_stream_id, version byte, program, PMT PID.
        assert_eq!(&section[3..5], &[0x00, 0x01]);
        assert_eq!(section[5], 0xC1);
        assert_eq!(&section[8..10], &[0x00, 0x01]);
        assert_eq!(&section[10..12], &[0xF0, 0x00]);
    }

    #[test]
    fn section_crc_residue_is_zero() {
        // Appending the CRC of a section makes the CRC of the whole zero.
        let pat = ProgramAssociation::default().encode_section();
        assert_eq!(Crc32::MPEG2.calculate(&pat), 0);

        let mut pmt = ProgramMap::new(1, 0x0100);
        pmt.streams.push(ElementaryStream {
            pid: 0x0100,
            stream_type: StreamType::H264,
        });
        pmt.streams.push(ElementaryStream {
            pid: 0x0101,
            stream_type: StreamType::AacAdts,
        });
        assert_eq!(Crc32::MPEG2.calculate(&pmt.encode_section()), 0);
    }

    #[test]
    fn pmt_section_lists_streams() {
        let mut pmt = ProgramMap::new(1, 0x0100);
        pmt.streams.push(ElementaryStream {
            pid: 0x0100,
            stream_type: StreamType::H265,
        });
        pmt.streams.push(ElementaryStream {
            pid: 0x0101,
            stream_type: StreamType::AacAdts,
        });
        let section = pmt.encode_section();

        assert_eq!(section[0], TABLE_ID_PMT);
        // PCR PID with reserved bits.
        assert_eq!(&section[8..10], &[0xE1, 0x00]);
        assert_eq!(&section[10..12], &[0xF0, 0x00]);
        // First stream entry.
        assert_eq!(section[12], 0x24);
        assert_eq!(&section[13..15], &[0xE1, 0x00]);
        // Second stream entry.
        assert_eq!(section[17], 0x0F);
        assert_eq!(&section[18..20], &[0xE1, 0x01]);
    }

    #[test]
    fn pat_packet_framing() {
        let packet = ProgramAssociation::default().packet(5);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        assert_eq!(buf.len(), PACKET_SIZE);
        assert_eq!(buf[0], 0x47);
        // PUSI set, PID zero.
        assert_eq!(buf[1], 0x40);
        assert_eq!(buf[2], 0x00);
        // Payload only, continuity counter 5.
        assert_eq!(buf[3], 0x15);
        // Pointer field then the section.
        assert_eq!(buf[4], 0x00);
        assert_eq!(buf[5], TABLE_ID_PAT);
        // Stuffing runs to the end of the packet.
        assert!(buf[4 + 1 + 16..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn pmt_packet_uses_given_pid() {
        let mut pmt = ProgramMap::new(1, 0x0100);
        pmt.streams.push(ElementaryStream {
            pid: 0x0100,
            stream_type: StreamType::H264,
        });
        let packet = pmt.packet(PMT_PID, 0);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        assert_eq!(buf[1], 0x50);
        assert_eq!(buf[2], 0x00);
        assert_eq!(buf[5], TABLE_ID_PMT);
    }
}
