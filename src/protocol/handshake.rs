//! RTMP handshake, both roles.
//!
//! Three flights on each side:
//!
//! ```text
//! client: C0 (version byte) + C1 (1536 bytes)  -->
//!         <--  S0 (version byte) + S1 (1536 bytes) + S2 (echo of C1)
//! client: C2 (echo of S1)  -->
//! ```
//!
//! C1/S1 carry 4 bytes of time, 4 zero bytes and 1528 random bytes. The
//! echo packets copy the peer's packet with the time2 field zeroed; peers
//! do not verify the echo contents, only the length. This is the simple
//! handshake; no HMAC digest variant.

use std::time::UNIX_EPOCH;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Which side of the handshake this machine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// No flight sent or expected yet
    Fresh,
    /// Expecting C0C1 (server) or S0S1S2 (client)
    AwaitHello,
    /// Expecting the trailing C2 (server only)
    AwaitEcho,
    Complete,
}

/// Handshake state machine, fed incrementally from the socket.
#[derive(Debug)]
pub struct Handshake {
    role: HandshakeRole,
    stage: Stage,
}

impl Handshake {
    pub fn new(role: HandshakeRole) -> Self {
        Self {
            role,
            stage: Stage::Fresh,
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Complete
    }

    /// Bytes required before the next call to [`process`](Self::process)
    /// can advance the machine.
    pub fn bytes_needed(&self) -> usize {
        match (self.stage, self.role) {
            (Stage::AwaitHello, HandshakeRole::Server) => 1 + HANDSHAKE_SIZE,
            (Stage::AwaitHello, HandshakeRole::Client) => 1 + 2 * HANDSHAKE_SIZE,
            (Stage::AwaitEcho, _) => HANDSHAKE_SIZE,
            _ => 0,
        }
    }

    /// Produce the opening flight and start expecting the peer.
    ///
    /// The client opens with C0C1; the server sends nothing until the
    /// client's hello arrives, so it gets `None` here.
    pub fn generate_initial(&mut self) -> Option<Bytes> {
        if self.stage != Stage::Fresh {
            return None;
        }
        self.stage = Stage::AwaitHello;

        if self.role == HandshakeRole::Server {
            return None;
        }
        let mut hello = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        hello.put_u8(RTMP_VERSION);
        hello.extend_from_slice(&fresh_packet());
        Some(hello.freeze())
    }

    /// Consume peer bytes; returns the next flight to send when one is due.
    ///
    /// Returns `Ok(None)` both when more bytes are needed and when the
    /// transition produces nothing to send (server consuming C2).
    pub fn process(&mut self, data: &mut Bytes) -> Result<Option<Bytes>> {
        if data.remaining() < self.bytes_needed() {
            return Ok(None);
        }

        match self.stage {
            Stage::AwaitHello => {
                match data.get_u8() {
                    RTMP_VERSION => {}
                    other => return Err(HandshakeError::InvalidVersion(other).into()),
                }
                let mut peer_packet = [0u8; HANDSHAKE_SIZE];
                data.copy_to_slice(&mut peer_packet);

                match self.role {
                    HandshakeRole::Server => {
                        self.stage = Stage::AwaitEcho;
                        Ok(Some(server_reply(&peer_packet)))
                    }
                    HandshakeRole::Client => {
                        // S2 is consumed without checking the echo, servers vary
                        data.advance(HANDSHAKE_SIZE);
                        self.stage = Stage::Complete;
                        Ok(Some(Bytes::copy_from_slice(&echo_packet(&peer_packet))))
                    }
                }
            }
            Stage::AwaitEcho => {
                // C2 is consumed without verification
                data.advance(HANDSHAKE_SIZE);
                self.stage = Stage::Complete;
                Ok(None)
            }
            Stage::Fresh | Stage::Complete => Ok(None),
        }
    }
}

/// S0S1S2 in one buffer, ready to write back to the client.
fn server_reply(c1: &[u8; HANDSHAKE_SIZE]) -> Bytes {
    let mut reply = BytesMut::with_capacity(1 + 2 * HANDSHAKE_SIZE);
    reply.put_u8(RTMP_VERSION);
    reply.extend_from_slice(&fresh_packet());
    reply.extend_from_slice(&echo_packet(c1));
    reply.freeze()
}

/// Build a C1/S1 packet: 4 bytes time, 4 zero bytes, 1528 random bytes.
///
/// The random fill is a plain LCG; the simple handshake carries no
/// cryptographic requirement.
fn fresh_packet() -> [u8; HANDSHAKE_SIZE] {
    let now_ms = UNIX_EPOCH
        .elapsed()
        .map_or(0, |since| since.as_millis() as u32);

    let mut packet = [0u8; HANDSHAKE_SIZE];
    packet[0..4].copy_from_slice(&now_ms.to_be_bytes());

    let mut seed = u64::from(now_ms) | 1;
    for byte in &mut packet[8..] {
        seed = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
        *byte = (seed >> 56) as u8;
    }

    packet
}

/// Build a C2/S2 packet: the peer's packet with the time2 field zeroed.
fn echo_packet(peer_packet: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *peer_packet;
    echo[4..8].copy_from_slice(&[0, 0, 0, 0]);
    echo
}
