//! Packetized Elementary Stream framing.
//!
//! One PES record wraps one access unit: a video frame's NAL units with
//! Annex-B start codes re-inserted, or an ADTS-framed AAC payload. The
//! optional header carries PTS/DTS; [`PacketizedElementaryStream::array_of_packets`]
//! slices the record into 188-byte transport packets for the wire, and the
//! `make_*_sample_buffer` methods run the inverse path back into timed
//! sample buffers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MpegTsError, Result};
use crate::media::aac::{AdtsReader, AudioSpecificConfig, ADTS_HEADER_SIZE};
use crate::media::nal::{find_nal_units, to_length_prefixed, START_CODE};
use crate::media::sample::{AudioSampleBuffer, ReceivedTiming, VideoSampleBuffer};
use crate::media::time::MediaTime;
use crate::media::{h264, h265};
use crate::mpegts::packet::{AdaptationField, TsPacket, MAX_PAYLOAD_SIZE};
use crate::mpegts::timestamp::TsTimestamp;

/// Stream id announcing a video elementary stream.
pub const STREAM_ID_VIDEO: u8 = 0xE0;
/// Stream id announcing an audio elementary stream.
pub const STREAM_ID_AUDIO: u8 = 0xC0;

const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
/// Start code, stream id and packet length.
const FIXED_HEADER_SIZE: usize = 6;

/// The flag section between packet length and the timestamp fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OptionalHeader {
    scrambling_control: u8,
    priority: bool,
    data_alignment_indicator: bool,
    copyright: bool,
    original_or_copy: bool,
    pts: Option<u64>,
    dts: Option<u64>,
}

impl OptionalHeader {
    fn indicator(&self) -> u8 {
        let mut indicator = 0;
        if self.pts.is_some() {
            indicator |= 0x02;
        }
        if self.dts.is_some() {
            indicator |= 0x01;
        }
        indicator
    }

    fn header_length(&self) -> u8 {
        let mut length = 0;
        if self.pts.is_some() {
            length += 5;
        }
        if self.dts.is_some() {
            length += 5;
        }
        length
    }

    fn encoded_len(&self) -> usize {
        3 + self.header_length() as usize
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut b0 = 0x80; // marker bits '10'
        b0 |= self.scrambling_control << 4;
        if self.priority {
            b0 |= 0x08;
        }
        if self.data_alignment_indicator {
            b0 |= 0x04;
        }
        if self.copyright {
            b0 |= 0x02;
        }
        if self.original_or_copy {
            b0 |= 0x01;
        }
        buf.put_u8(b0);
        let indicator = self.indicator();
        buf.put_u8(indicator << 6);
        buf.put_u8(self.header_length());
        if let Some(pts) = self.pts {
            buf.put_slice(&TsTimestamp::encode(pts, indicator << 4));
        }
        if let Some(dts) = self.dts {
            buf.put_slice(&TsTimestamp::encode(dts, TsTimestamp::DTS));
        }
    }

    /// Parse the flag section, leaving `data` positioned at the payload.
    fn parse(data: &mut Bytes) -> Result<Self> {
        if data.len() < 3 {
            return Err(MpegTsError::TruncatedHeader.into());
        }
        let b0 = data.get_u8();
        let b1 = data.get_u8();
        let pes_header_length = data.get_u8() as usize;
        if data.len() < pes_header_length {
            return Err(MpegTsError::TruncatedHeader.into());
        }
        let mut fields = data.copy_to_bytes(pes_header_length);

        let indicator = (b1 >> 6) & 0x03;
        let mut pts = None;
        let mut dts = None;
        if indicator & 0x02 != 0 {
            if fields.len() < 5 {
                return Err(MpegTsError::TruncatedHeader.into());
            }
            let mut raw = [0u8; 5];
            fields.copy_to_slice(&mut raw);
            pts = Some(TsTimestamp::decode(&raw));
        }
        if indicator & 0x01 != 0 {
            if fields.len() < 5 {
                return Err(MpegTsError::TruncatedHeader.into());
            }
            let mut raw = [0u8; 5];
            fields.copy_to_slice(&mut raw);
            dts = Some(TsTimestamp::decode(&raw));
        }

        Ok(OptionalHeader {
            scrambling_control: (b0 >> 4) & 0x03,
            priority: b0 & 0x08 != 0,
            data_alignment_indicator: b0 & 0x04 != 0,
            copyright: b0 & 0x02 != 0,
            original_or_copy: b0 & 0x01 != 0,
            pts,
            dts,
        })
    }
}

/// One PES record, created per access unit.
#[derive(Debug, Clone)]
pub struct PacketizedElementaryStream {
    stream_id: u8,
    packet_length: u16,
    optional_header: OptionalHeader,
    data: Bytes,
}

impl PacketizedElementaryStream {
    /// Build an audio PES from one raw AAC frame.
    ///
    /// Returns `None` when the ADTS-framed payload does not fit a bounded
    /// packet; audio is never sent unbounded.
    pub fn new_audio(
        payload: &[u8],
        presentation_time_stamp: MediaTime,
        config: &AudioSpecificConfig,
    ) -> Option<Self> {
        let mut data = BytesMut::with_capacity(ADTS_HEADER_SIZE + payload.len());
        data.put_slice(&config.make_adts_header(payload.len()));
        data.put_slice(payload);

        let optional_header = OptionalHeader {
            data_alignment_indicator: true,
            pts: Some(presentation_time_stamp.ticks_90khz() as u64),
            ..Default::default()
        };
        let length = data.len() + optional_header.encoded_len();
        if length >= u16::MAX as usize {
            return None;
        }
        Some(PacketizedElementaryStream {
            stream_id: STREAM_ID_AUDIO,
            packet_length: length as u16,
            optional_header,
            data: data.freeze(),
        })
    }

    /// Build a video PES from one access unit of AVC NAL units.
    ///
    /// `config` is passed on IDR frames and configuration changes only;
    /// the access unit delimiter announces whether parameter sets follow.
    pub fn new_video_avc(
        nal_units: &[Bytes],
        presentation_time_stamp: MediaTime,
        decode_time_stamp: Option<MediaTime>,
        config: Option<&h264::AvcConfig>,
    ) -> Self {
        let mut data = BytesMut::new();
        match config {
            Some(config) => {
                data.put_slice(&h264::AUD_I);
                for sps in &config.sps {
                    data.put_slice(&START_CODE);
                    data.put_slice(sps);
                }
                for pps in &config.pps {
                    data.put_slice(&START_CODE);
                    data.put_slice(pps);
                }
            }
            None => data.put_slice(&h264::AUD_I_P),
        }
        for unit in nal_units {
            data.put_slice(&START_CODE);
            data.put_slice(unit);
        }
        Self::new_video(data.freeze(), presentation_time_stamp, decode_time_stamp)
    }

    /// Build a video PES from one access unit of HEVC NAL units.
    pub fn new_video_hevc(
        nal_units: &[Bytes],
        presentation_time_stamp: MediaTime,
        decode_time_stamp: Option<MediaTime>,
        config: Option<&h265::HevcConfig>,
        timecode: Option<h265::TimeCode>,
    ) -> Self {
        let mut data = BytesMut::new();
        data.put_slice(&h265::AUD);
        if let Some(config) = config {
            for nalu in config.vps.iter().chain(&config.sps).chain(&config.pps) {
                data.put_slice(&START_CODE);
                data.put_slice(nalu);
            }
        }
        if let Some(timecode) = timecode {
            data.put_slice(&timecode.encode_sei());
        }
        for unit in nal_units {
            data.put_slice(&START_CODE);
            data.put_slice(unit);
        }
        Self::new_video(data.freeze(), presentation_time_stamp, decode_time_stamp)
    }

    fn new_video(
        data: Bytes,
        presentation_time_stamp: MediaTime,
        decode_time_stamp: Option<MediaTime>,
    ) -> Self {
        let optional_header = OptionalHeader {
            data_alignment_indicator: true,
            pts: Some(presentation_time_stamp.ticks_90khz() as u64),
            dts: decode_time_stamp.map(|t| t.ticks_90khz() as u64),
            ..Default::default()
        };
        let length = data.len() + optional_header.encoded_len();
        // An oversized record stays unbounded, length zero.
        let packet_length = if length < u16::MAX as usize {
            length as u16
        } else {
            0
        };
        PacketizedElementaryStream {
            stream_id: STREAM_ID_VIDEO,
            packet_length,
            optional_header,
            data,
        }
    }

    /// Parse a complete PES record.
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(MpegTsError::TruncatedHeader.into());
        }
        let mut start_code = [0u8; 3];
        data.copy_to_slice(&mut start_code);
        if start_code != PES_START_CODE {
            return Err(MpegTsError::BadStartCode.into());
        }
        let stream_id = data.get_u8();
        let packet_length = data.get_u16();
        let optional_header = OptionalHeader::parse(&mut data)?;
        Ok(PacketizedElementaryStream {
            stream_id,
            packet_length,
            optional_header,
            data,
        })
    }

    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    /// Zero means unbounded.
    pub fn packet_length(&self) -> u16 {
        self.packet_length
    }

    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    /// Extend an unbounded record with more payload.
    pub fn append(&mut self, data: &[u8]) {
        let mut combined = BytesMut::with_capacity(self.data.len() + data.len());
        combined.put_slice(&self.data);
        combined.put_slice(data);
        self.data = combined.freeze();
    }

    pub fn presentation_time_stamp(&self) -> Option<MediaTime> {
        self.optional_header
            .pts
            .map(|t| MediaTime::from_ticks_90khz(t as i64))
    }

    pub fn decode_time_stamp(&self) -> Option<MediaTime> {
        self.optional_header
            .dts
            .map(|t| MediaTime::from_ticks_90khz(t as i64))
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            FIXED_HEADER_SIZE + self.optional_header.encoded_len() + self.data.len(),
        );
        buf.put_slice(&PES_START_CODE);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);
        self.optional_header.encode(&mut buf);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Slice the record into 188-byte transport packets.
    ///
    /// The first packet carries the payload unit start flag and an
    /// adaptation field with the random access indicator and optional PCR.
    /// Continuity counters are left at zero for the outer writer.
    pub fn array_of_packets(
        &self,
        pid: u16,
        random_access_indicator: bool,
        program_clock_reference: Option<u64>,
    ) -> Vec<TsPacket> {
        let payload = self.encode();
        let mut packets = Vec::with_capacity(payload.len() / MAX_PAYLOAD_SIZE + 2);
        let mut offset = append_first_packet(
            pid,
            random_access_indicator,
            program_clock_reference,
            &mut packets,
            &payload,
        );
        offset = append_middle_packets(pid, &mut packets, offset, &payload);
        append_last_packets(pid, &mut packets, offset, &payload);
        packets
    }

    /// Rebuild a timed video sample buffer from a reassembled record.
    ///
    /// Start codes are stripped back out into length-prefixed records for
    /// the decoder. Returns `None` when the record carries no presentation
    /// timestamp or no NAL units; the caller drops the frame.
    pub fn make_video_sample_buffer(
        &self,
        base_presentation_time_stamp: MediaTime,
        timing: &mut ReceivedTiming,
        sync: bool,
    ) -> Option<VideoSampleBuffer> {
        let received_pts = self.presentation_time_stamp()?;
        let received_dts = self.decode_time_stamp();

        let units = find_nal_units(&self.data);
        if units.is_empty() {
            return None;
        }
        let data = to_length_prefixed(&self.data, &units);

        let (pts, dts, duration) =
            timing.reconcile(base_presentation_time_stamp, received_pts, received_dts);
        Some(VideoSampleBuffer {
            sample_size: data.len(),
            data,
            presentation_time_stamp: pts,
            decode_time_stamp: dts,
            duration,
            sync,
        })
    }

    /// Rebuild a timed audio sample buffer from a reassembled record.
    ///
    /// Returns `None` when the record carries no presentation timestamp or
    /// no complete ADTS frame.
    pub fn make_audio_sample_buffer(
        &self,
        base_presentation_time_stamp: MediaTime,
        timing: &mut ReceivedTiming,
    ) -> Option<AudioSampleBuffer> {
        let received_pts = self.presentation_time_stamp()?;

        let sample_sizes: Vec<usize> = AdtsReader::new(&self.data).collect();
        if sample_sizes.is_empty() {
            return None;
        }
        let data = self.data.slice(ADTS_HEADER_SIZE..);

        let (pts, _, duration) = timing.reconcile(base_presentation_time_stamp, received_pts, None);
        Some(AudioSampleBuffer {
            data,
            sample_sizes,
            presentation_time_stamp: pts,
            duration,
        })
    }
}

fn append_first_packet(
    pid: u16,
    random_access_indicator: bool,
    program_clock_reference: Option<u64>,
    packets: &mut Vec<TsPacket>,
    payload: &Bytes,
) -> usize {
    let mut packet = TsPacket::new(pid);
    packet.payload_unit_start_indicator = true;
    packet.adaptation_field = Some(AdaptationField {
        random_access_indicator,
        program_clock_reference: program_clock_reference.map(|base| (base, 0)),
        ..Default::default()
    });
    let take = packet.available_payload_len().min(payload.len());
    packet.payload = payload.slice(..take);
    packets.push(packet);
    take
}

fn append_middle_packets(
    pid: u16,
    packets: &mut Vec<TsPacket>,
    mut offset: usize,
    payload: &Bytes,
) -> usize {
    while offset + MAX_PAYLOAD_SIZE <= payload.len() {
        let mut packet = TsPacket::new(pid);
        packet.payload = payload.slice(offset..offset + MAX_PAYLOAD_SIZE);
        packets.push(packet);
        offset += MAX_PAYLOAD_SIZE;
    }
    offset
}

fn append_last_packets(pid: u16, packets: &mut Vec<TsPacket>, offset: usize, payload: &Bytes) {
    let rest = (payload.len() - offset) % MAX_PAYLOAD_SIZE;
    match rest {
        0 => {}
        // A 183-byte tail fits neither a bare packet nor a stuffed one,
        // so it is split over two adaptation-field packets.
        183 => {
            let mut packet = TsPacket::new(pid);
            packet.adaptation_field = Some(AdaptationField::new());
            packet.payload = payload.slice(offset..offset + 182);
            packets.push(packet);

            let mut packet = TsPacket::new(pid);
            packet.adaptation_field = Some(AdaptationField::new());
            packet.payload = payload.slice(offset + 182..);
            packets.push(packet);
        }
        _ => {
            let mut packet = TsPacket::new(pid);
            packet.adaptation_field = Some(AdaptationField::new());
            packet.payload = payload.slice(offset..);
            packets.push(packet);
        }
    }
}
