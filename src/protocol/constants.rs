//! Protocol constants: wire numbers, command strings and tuning defaults.
//!
//! Values come from the Adobe RTMP specification (December 2012) plus the
//! de facto extensions every live encoder ships.

/// Version byte exchanged in C0/S0. Standard RTMP is always 3.
pub const RTMP_VERSION: u8 = 3;

/// Well-known RTMP port.
pub const RTMP_PORT: u16 = 1935;

/// Well-known port for the TLS and tunneled schemes (rtmps, rtmpts).
pub const RTMPS_PORT: u16 = 443;

/// Size of the C1/C2/S1/S2 handshake packets.
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk payload size in effect until a Set Chunk Size arrives.
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size this crate switches to once a publish session is up.
pub const PUBLISH_CHUNK_SIZE: u32 = 8192;

/// Chunk size the server announces to publishers in the connect response.
pub const SERVER_CHUNK_SIZE: u32 = 4096;

/// Reassembled messages above this size tear the connection down.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Timestamps at or above this value move to the extended timestamp field.
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

// Chunk stream ids this crate sends on. Receivers accept any csid.

/// Protocol control messages (Set Chunk Size, Acknowledgement, ...).
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, publish, ...).
pub const CSID_COMMAND: u32 = 3;

/// Audio, video and stream metadata.
pub const CSID_DATA: u32 = 8;

// Chunk basic header fmt values.

/// Full 11-byte message header: timestamp, length, type and stream id.
pub const CHUNK_FMT_0: u8 = 0;

/// 7-byte header: timestamp delta, length and type, stream id carried over.
pub const CHUNK_FMT_1: u8 = 1;

/// 3-byte header carrying only a timestamp delta.
pub const CHUNK_FMT_2: u8 = 2;

/// Continuation chunk, everything carried over from the previous header.
pub const CHUNK_FMT_3: u8 = 3;

// Message type ids.

pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
/// AMF3 data message. The payload is a zero byte followed by AMF0 values.
pub const MSG_DATA_AMF3: u8 = 15;
/// AMF3 command message, same zero-byte prefix as [`MSG_DATA_AMF3`].
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types.

/// Sent by the server once a message stream is ready to carry media.
pub const UC_STREAM_BEGIN: u16 = 0;

/// Sent by the server when a stream runs out of media.
pub const UC_STREAM_EOF: u16 = 1;

/// Buffer length hint from a playing client, milliseconds.
pub const UC_SET_BUFFER_LENGTH: u16 = 3;

/// Keepalive probe, answered with [`UC_PING_RESPONSE`].
pub const UC_PING_REQUEST: u16 = 6;

/// Answer to a ping request, echoing its payload.
pub const UC_PING_RESPONSE: u16 = 7;

/// Set Peer Bandwidth limit type: adapt to whichever limit is lower.
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

// Command names.

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CLOSE: &str = "close";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_PLAY: &str = "play";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";

// Pre-publish shims every real encoder sends.
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";

// Data message names.
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";
pub const CMD_ON_METADATA: &str = "onMetaData";

// Status codes carried in _result, _error and onStatus info objects.

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NC_CONNECT_REJECTED: &str = "NetConnection.Connect.Rejected";
pub const NC_CONNECT_CLOSED: &str = "NetConnection.Connect.Closed";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
pub const NS_PLAY_FAILED: &str = "NetStream.Play.Failed";

// Flow control defaults.

/// Window acknowledgement size the server advertises.
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Peer bandwidth the server advertises.
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Window acknowledgement size the publishing client answers with.
pub const CLIENT_WINDOW_ACK_SIZE: u32 = 100_000;
