//! MPEG transport stream packetization
//!
//! This module provides:
//! - PES packet building and parsing with PTS/DTS carriage
//! - Slicing of PES packets into 188-byte transport packets
//! - PAT/PMT program tables with CRC-32/MPEG-2 sealing
//! - PCR and timestamp codecs at 90 kHz resolution

pub mod crc32;
pub mod packet;
pub mod pes;
pub mod psi;
pub mod timestamp;

pub use crc32::Crc32;
pub use packet::{AdaptationField, TsPacket, PACKET_SIZE};
pub use pes::{PacketizedElementaryStream, STREAM_ID_AUDIO, STREAM_ID_VIDEO};
pub use psi::{ElementaryStream, ProgramAssociation, ProgramMap, StreamType, PAT_PID, PMT_PID};
pub use timestamp::{ProgramClockReference, TsTimestamp};
