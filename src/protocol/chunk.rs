//! RTMP chunk stream layer.
//!
//! Messages are carried over the wire as chunks. Each chunk starts with a
//! basic header (format bits and chunk stream id), followed by a message
//! header whose size depends on the format:
//!
//! - Type 0 (11 bytes): absolute timestamp, message length, message type id,
//!   message stream id (little endian)
//! - Type 1 (7 bytes): timestamp delta, message length, message type id
//! - Type 2 (3 bytes): timestamp delta only
//! - Type 3 (0 bytes): everything inherited from the previous chunk
//!
//! Timestamps at or above 0xFFFFFF are written as 0xFFFFFF in the header
//! field with the real value in a 4-byte extended timestamp that follows the
//! message header. Once a chunk stream is in extended mode, its type 3
//! continuations carry the extended timestamp as well.
//!
//! Messages larger than the negotiated chunk size are split into pieces of
//! at most that size. The first piece carries the full header, the rest are
//! type 3 continuations on the same chunk stream id.

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::{
    CHUNK_FMT_0, CHUNK_FMT_1, CHUNK_FMT_2, CHUNK_FMT_3, DEFAULT_CHUNK_SIZE,
    EXTENDED_TIMESTAMP_THRESHOLD, MAX_MESSAGE_SIZE,
};

/// A single RTMP message as carried by the chunk layer.
///
/// On the inbound side the decoder accumulates chunk payloads into one of
/// these until `message_length` bytes have arrived. On the outbound side a
/// complete chunk can be serialized with [`encode`](RtmpChunk::encode) and
/// broken into wire pieces with [`split`](RtmpChunk::split).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpChunk {
    /// Header format (0-3) this chunk was built or received with.
    pub header_type: u8,
    /// Chunk stream id.
    pub csid: u32,
    /// Absolute timestamp in milliseconds.
    pub timestamp: u32,
    /// Message type id.
    pub message_type: u8,
    /// Message stream id.
    pub stream_id: u32,
    /// Declared message length in bytes.
    message_length: u32,
    /// Accumulated message body.
    payload: BytesMut,
    /// True when the last append ended exactly on a chunk boundary.
    fragmented: bool,
}

impl RtmpChunk {
    /// Creates a complete chunk carrying `payload` with a type 0 header.
    pub fn new(csid: u32, timestamp: u32, message_type: u8, stream_id: u32, payload: &[u8]) -> Self {
        RtmpChunk {
            header_type: CHUNK_FMT_0,
            csid,
            timestamp,
            message_type,
            stream_id,
            message_length: payload.len() as u32,
            payload: BytesMut::from(payload),
            fragmented: false,
        }
    }

    /// Creates an empty chunk that expects `message_length` bytes of body,
    /// to be filled in with [`append`](RtmpChunk::append).
    pub fn with_length(
        header_type: u8,
        csid: u32,
        timestamp: u32,
        message_type: u8,
        stream_id: u32,
        message_length: u32,
    ) -> Self {
        RtmpChunk {
            header_type,
            csid,
            timestamp,
            message_type,
            stream_id,
            message_length,
            payload: BytesMut::with_capacity(message_length as usize),
            fragmented: false,
        }
    }

    /// Declared message length in bytes.
    pub fn message_length(&self) -> u32 {
        self.message_length
    }

    /// The message body accumulated so far.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Takes the message body out of the chunk.
    pub fn take_payload(&mut self) -> Bytes {
        self.payload.split().freeze()
    }

    /// True once the full `message_length` bytes have been appended.
    pub fn is_complete(&self) -> bool {
        self.payload.len() >= self.message_length as usize
    }

    /// True when the accumulated body ends exactly on a boundary of the
    /// chunk size last passed to [`append`](RtmpChunk::append), meaning the
    /// next bytes belong to a new chunk header rather than this body.
    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }

    /// Appends at most one chunk's worth of body bytes from `data`.
    ///
    /// Takes no more than the remaining message bytes and never crosses a
    /// `maximum_size` boundary. Returns the number of bytes consumed.
    pub fn append(&mut self, data: &[u8], maximum_size: usize) -> usize {
        self.fragmented = false;
        let mut length = (self.message_length as usize).saturating_sub(self.payload.len());
        if data.len() < length {
            length = data.len();
        }
        let chunk_size = maximum_size - self.payload.len() % maximum_size;
        if chunk_size < length {
            length = chunk_size;
        }
        if length > 0 {
            self.payload.put_slice(&data[..length]);
        }
        self.fragmented = self.payload.len() % maximum_size == 0;
        length
    }

    /// Serializes the chunk header followed by the whole body.
    ///
    /// The output is a single contiguous buffer with no regard for the peer
    /// chunk size. Use [`split`](RtmpChunk::split) to produce wire pieces.
    pub fn encode(&self) -> Bytes {
        let needs_extended = self.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let mut buf = BytesMut::with_capacity(
            basic_header_size(self.csid) + 11 + 4 + self.payload.len(),
        );
        write_basic_header(&mut buf, self.header_type, self.csid);
        let timestamp_field = if needs_extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            self.timestamp
        };
        match self.header_type {
            CHUNK_FMT_0 => {
                write_u24(&mut buf, timestamp_field);
                write_u24(&mut buf, self.message_length);
                buf.put_u8(self.message_type);
                buf.put_u32_le(self.stream_id);
            }
            CHUNK_FMT_1 => {
                write_u24(&mut buf, timestamp_field);
                write_u24(&mut buf, self.message_length);
                buf.put_u8(self.message_type);
            }
            CHUNK_FMT_2 => {
                write_u24(&mut buf, timestamp_field);
            }
            _ => {}
        }
        if needs_extended && self.header_type != CHUNK_FMT_3 {
            buf.put_u32(self.timestamp);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Serializes the chunk as one or more wire pieces of at most
    /// `maximum_size` body bytes each.
    ///
    /// The first piece carries this chunk's header, every following piece is
    /// prefixed with a type 3 basic header for the same chunk stream id. When
    /// the timestamp is in extended mode the continuations repeat the 4-byte
    /// extended timestamp after their basic header.
    pub fn split(&self, maximum_size: usize) -> Vec<Bytes> {
        let encoded = self.encode();
        if self.payload.len() <= maximum_size {
            return vec![encoded];
        }
        let header_len = encoded.len() - self.payload.len();
        let first_end = header_len + maximum_size;
        let mut pieces = vec![encoded.slice(..first_end)];

        let needs_extended = self.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let mut prefix = BytesMut::with_capacity(basic_header_size(self.csid) + 4);
        write_basic_header(&mut prefix, CHUNK_FMT_3, self.csid);
        if needs_extended {
            prefix.put_u32(self.timestamp);
        }

        let mut offset = first_end;
        while offset < encoded.len() {
            let end = (offset + maximum_size).min(encoded.len());
            let mut piece = BytesMut::with_capacity(prefix.len() + end - offset);
            piece.put_slice(&prefix);
            piece.put_slice(&encoded[offset..end]);
            pieces.push(piece.freeze());
            offset = end;
        }
        pieces
    }
}

impl fmt::Display for RtmpChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk csid={} type={} ts={} sid={} len={}",
            self.csid, self.message_type, self.timestamp, self.stream_id, self.message_length
        )
    }
}

/// Per chunk stream decoder state.
#[derive(Debug, Default)]
struct InboundState {
    timestamp: u32,
    timestamp_delta: u32,
    message_length: u32,
    message_type: u8,
    stream_id: u32,
    has_extended_timestamp: bool,
    seen_header: bool,
    pending: Option<RtmpChunk>,
}

/// Stateful decoder that reassembles chunks into complete messages.
///
/// Feed raw bytes in with [`decode`](ChunkDecoder::decode); it returns a
/// complete message when one is available and `None` when more bytes are
/// needed. Consumption is atomic per chunk, a partially received chunk
/// leaves the input buffer untouched.
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: u32,
    max_message_size: u32,
    streams: HashMap<u32, InboundState>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    pub fn new() -> Self {
        ChunkDecoder {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Applies a Set Chunk Size message received from the peer.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size;
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Discards the partially received message on `csid`, as requested by an
    /// Abort message.
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.pending = None;
        }
    }

    /// Decodes one chunk from `buf` if fully available.
    ///
    /// Returns `Ok(Some(..))` when the chunk completed a message,
    /// `Ok(None)` when more bytes are needed or the chunk was an
    /// intermediate piece of a larger message.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpChunk>> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(header) => header,
            None => return Ok(None),
        };
        let state = self.streams.entry(csid).or_default();

        // Continuation of a partially received message. The header fields
        // are inherited, only the payload piece follows.
        if fmt == CHUNK_FMT_3 {
            if let Some(pending) = state.pending.as_mut() {
                let extended_len = if state.has_extended_timestamp { 4 } else { 0 };
                let remaining = (pending.message_length as usize).saturating_sub(pending.payload.len());
                let piece = remaining.min(self.chunk_size as usize);
                if buf.len() < basic_len + extended_len + piece {
                    return Ok(None);
                }
                buf.advance(basic_len + extended_len);
                let consumed = pending.append(&buf[..piece], self.chunk_size as usize);
                buf.advance(consumed);
                if pending.is_complete() {
                    return Ok(state.pending.take());
                }
                return Ok(None);
            }
        }

        if fmt != CHUNK_FMT_0 && !state.seen_header {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }

        let header_len = message_header_size(fmt);
        // Peek the header without consuming so a short buffer can be retried.
        let needs_extended = if fmt == CHUNK_FMT_3 {
            state.has_extended_timestamp
        } else {
            if buf.len() < basic_len + header_len {
                return Ok(None);
            }
            read_u24(&buf[basic_len..]) >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let extended_len = if needs_extended { 4 } else { 0 };
        let total_header = basic_len + header_len + extended_len;
        if buf.len() < total_header {
            return Ok(None);
        }

        let mut peek = &buf[basic_len..];
        let mut timestamp_field = state.timestamp_delta;
        let mut message_length = state.message_length;
        let mut message_type = state.message_type;
        let mut stream_id = state.stream_id;
        match fmt {
            CHUNK_FMT_0 => {
                timestamp_field = peek.get_uint(3) as u32;
                message_length = peek.get_uint(3) as u32;
                message_type = peek.get_u8();
                stream_id = peek.get_u32_le();
            }
            CHUNK_FMT_1 => {
                timestamp_field = peek.get_uint(3) as u32;
                message_length = peek.get_uint(3) as u32;
                message_type = peek.get_u8();
            }
            CHUNK_FMT_2 => {
                timestamp_field = peek.get_uint(3) as u32;
            }
            _ => {}
        }
        if needs_extended {
            timestamp_field = peek.get_u32();
        }

        if message_length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message_length,
                max: self.max_message_size,
            }
            .into());
        }

        let piece = (message_length as usize).min(self.chunk_size as usize);
        if buf.len() < total_header + piece {
            return Ok(None);
        }
        buf.advance(total_header);

        // A type 0 header carries an absolute timestamp, every other format
        // advances the previous timestamp by a delta. The field value also
        // becomes the delta applied by future type 3 chunks.
        let timestamp = if fmt == CHUNK_FMT_0 {
            timestamp_field
        } else {
            state.timestamp.wrapping_add(timestamp_field)
        };
        state.timestamp = timestamp;
        state.timestamp_delta = timestamp_field;
        state.message_length = message_length;
        state.message_type = message_type;
        state.stream_id = stream_id;
        state.has_extended_timestamp = needs_extended;
        state.seen_header = true;

        let mut chunk =
            RtmpChunk::with_length(fmt, csid, timestamp, message_type, stream_id, message_length);
        let consumed = chunk.append(&buf[..piece], self.chunk_size as usize);
        buf.advance(consumed);
        if chunk.is_complete() {
            return Ok(Some(chunk));
        }
        state.pending = Some(chunk);
        Ok(None)
    }
}

/// Per chunk stream encoder state used for header compression.
#[derive(Debug, Default)]
struct OutboundState {
    timestamp: u32,
    timestamp_delta: u32,
    message_length: u32,
    message_type: u8,
    stream_id: u32,
    seen: bool,
}

/// Stateful encoder that writes messages as chunk sequences.
///
/// Headers are compressed against the previous message on the same chunk
/// stream: repeated metadata is elided down to type 1, 2 or 3 headers.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
    streams: HashMap<u32, OutboundState>,
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkEncoder {
    pub fn new() -> Self {
        ChunkEncoder {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Applies our own Set Chunk Size announcement to future output.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size;
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Writes `chunk` to `buf` as one or more wire pieces.
    pub fn encode(&mut self, chunk: &RtmpChunk, buf: &mut BytesMut) {
        let state = self.streams.entry(chunk.csid).or_default();
        let fmt = select_format(state, chunk);
        let delta = chunk.timestamp.wrapping_sub(state.timestamp);
        let timestamp = if fmt == CHUNK_FMT_0 { chunk.timestamp } else { delta };
        let needs_extended = timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let timestamp_field = if needs_extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            timestamp
        };

        write_basic_header(buf, fmt, chunk.csid);
        match fmt {
            CHUNK_FMT_0 => {
                write_u24(buf, timestamp_field);
                write_u24(buf, chunk.message_length);
                buf.put_u8(chunk.message_type);
                buf.put_u32_le(chunk.stream_id);
            }
            CHUNK_FMT_1 => {
                write_u24(buf, timestamp_field);
                write_u24(buf, chunk.message_length);
                buf.put_u8(chunk.message_type);
            }
            CHUNK_FMT_2 => {
                write_u24(buf, timestamp_field);
            }
            _ => {}
        }
        if needs_extended {
            buf.put_u32(timestamp);
        }

        let payload = chunk.payload();
        let first = payload.len().min(self.chunk_size as usize);
        buf.put_slice(&payload[..first]);

        // Remaining pieces continue on the same chunk stream with type 3
        // headers, repeating the extended timestamp when one is in use.
        let mut offset = first;
        while offset < payload.len() {
            let end = (offset + self.chunk_size as usize).min(payload.len());
            write_basic_header(buf, CHUNK_FMT_3, chunk.csid);
            if needs_extended {
                buf.put_u32(timestamp);
            }
            buf.put_slice(&payload[offset..end]);
            offset = end;
        }

        state.timestamp = chunk.timestamp;
        state.timestamp_delta = delta;
        state.message_length = chunk.message_length;
        state.message_type = chunk.message_type;
        state.stream_id = chunk.stream_id;
        state.seen = true;
    }
}

/// Picks the smallest header format that still conveys everything that
/// changed since the previous message on this chunk stream.
fn select_format(state: &OutboundState, chunk: &RtmpChunk) -> u8 {
    if !state.seen || chunk.stream_id != state.stream_id {
        return CHUNK_FMT_0;
    }
    // Deltas only make sense for monotonic timestamps.
    if chunk.timestamp < state.timestamp {
        return CHUNK_FMT_0;
    }
    if chunk.message_length != state.message_length || chunk.message_type != state.message_type {
        return CHUNK_FMT_1;
    }
    if chunk.timestamp.wrapping_sub(state.timestamp) != state.timestamp_delta {
        return CHUNK_FMT_2;
    }
    CHUNK_FMT_3
}

/// Parses a basic header from the front of `buf` without consuming it.
///
/// Returns the format bits, the chunk stream id and the header size in
/// bytes, or `None` when the buffer is too short.
pub(crate) fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = first >> 6;
    match first & 0x3F {
        0 => {
            let second = *buf.get(1)?;
            Some((fmt, 64 + second as u32, 2))
        }
        1 => {
            let second = *buf.get(1)?;
            let third = *buf.get(2)?;
            Some((fmt, 64 + ((second as u32) << 8 | third as u32), 3))
        }
        csid => Some((fmt, csid as u32, 1)),
    }
}

/// Size in bytes of the basic header for `csid`.
pub(crate) fn basic_header_size(csid: u32) -> usize {
    if csid <= 63 {
        1
    } else if csid <= 319 {
        2
    } else {
        3
    }
}

/// Size in bytes of the message header for a given format.
pub(crate) fn message_header_size(fmt: u8) -> usize {
    match fmt {
        CHUNK_FMT_0 => 11,
        CHUNK_FMT_1 => 7,
        CHUNK_FMT_2 => 3,
        _ => 0,
    }
}

/// Writes the basic header for `csid` in its shortest form.
pub(crate) fn write_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    if csid <= 63 {
        buf.put_u8(fmt << 6 | csid as u8);
    } else if csid <= 319 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8(fmt << 6 | 1);
        buf.put_u16((csid - 64) as u16);
    }
}

pub(crate) fn write_u24(buf: &mut BytesMut, value: u32) {
    buf.put_uint(value as u64 & 0xFFFFFF, 3);
}

pub(crate) fn read_u24(buf: &[u8]) -> u32 {
    (buf[0] as u32) << 16 | (buf[1] as u32) << 8 | buf[2] as u32
}
