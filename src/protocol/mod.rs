//! RTMP protocol layer.
//!
//! This module provides:
//! - Wire constants, message type ids and well known command names
//! - The C0/C1/C2 and S0/S1/S2 handshake state machine
//! - Chunk assembly and serialization with header compression
//! - Typed messages parsed from and encoded to chunk payloads

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RtmpChunk};
pub use handshake::{Handshake, HandshakeRole};
pub use message::{
    Command, ConnectParams, DataMessage, PublishParams, RtmpMessage, UserControlEvent,
};
