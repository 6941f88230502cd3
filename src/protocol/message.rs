//! RTMP message types and parsing.
//!
//! A message is the unit above the chunk layer: control messages govern
//! the chunk session itself, commands and data messages carry AMF, and
//! audio/video messages carry coded media. Flash Media Server wraps its
//! AMF3 command and data messages (types 17 and 15) in a single 0x00
//! byte followed by plain AMF0, so both flavors share one codec here.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{Amf0Decoder, Amf0Encoder, AmfValue};
use crate::error::{AmfError, ProtocolError, Result};
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;

/// A parsed RTMP message.
///
/// Control messages (types 1 to 6) always travel on chunk stream 2,
/// message stream 0. The rest carry the application payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    /// Type 1, new chunk size for everything the peer sends next
    SetChunkSize(u32),
    /// Type 2, discard the partially received message on `csid`
    Abort { csid: u32 },
    /// Type 3, peer has received this many bytes so far
    Acknowledgement { sequence: u32 },
    /// Type 4, stream lifecycle and ping events
    UserControl(UserControlEvent),
    /// Type 5, bytes the peer may send between acknowledgements
    WindowAckSize(u32),
    /// Type 6, ask the peer to limit its send rate
    SetPeerBandwidth { size: u32, limit_type: u8 },
    /// Type 8, one audio frame with its FLV tag header
    Audio { timestamp: u32, data: Bytes },
    /// Type 9, one video frame with its FLV tag header
    Video { timestamp: u32, data: Bytes },
    /// Types 20 and 17, AMF-encoded RPC
    Command(Command),
    /// Types 18 and 15, AMF-encoded metadata
    Data(DataMessage),
    /// Anything this engine does not interpret
    Unknown { type_id: u8, data: Bytes },
}

/// User Control event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

impl UserControlEvent {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(10);
        match self {
            Self::StreamBegin(id) => {
                buf.put_u16(UC_STREAM_BEGIN);
                buf.put_u32(*id);
            }
            Self::StreamEof(id) => {
                buf.put_u16(UC_STREAM_EOF);
                buf.put_u32(*id);
            }
            Self::SetBufferLength {
                stream_id,
                buffer_ms,
            } => {
                buf.put_u16(UC_SET_BUFFER_LENGTH);
                buf.put_u32(*stream_id);
                buf.put_u32(*buffer_ms);
            }
            Self::PingRequest(ts) => {
                buf.put_u16(UC_PING_REQUEST);
                buf.put_u32(*ts);
            }
            Self::PingResponse(ts) => {
                buf.put_u16(UC_PING_RESPONSE);
                buf.put_u32(*ts);
            }
            Self::Unknown { event_type, data } => {
                buf.put_u16(*event_type);
                buf.put_slice(data);
            }
        }
        buf.freeze()
    }
}

/// An RTMP command such as connect, createStream or publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction id, 0 for notifications
    pub transaction_id: f64,
    /// Command object, often null in responses
    pub command_object: AmfValue,
    /// Positional arguments after the command object
    pub arguments: Vec<AmfValue>,
    /// Message stream id the command arrived or leaves on
    pub stream_id: u32,
    /// True when the command should be sent with the AMF3 envelope
    pub amf3: bool,
}

impl Command {
    pub fn new(name: &str, transaction_id: f64, command_object: AmfValue) -> Self {
        Self {
            name: name.to_string(),
            transaction_id,
            command_object,
            arguments: Vec::new(),
            stream_id: 0,
            amf3: false,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<AmfValue>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Builds a _result response to `transaction_id`.
    pub fn result(transaction_id: f64, properties: AmfValue, info: AmfValue) -> Self {
        Self::new(CMD_RESULT, transaction_id, properties).with_arguments(vec![info])
    }

    /// Builds an _error response to `transaction_id`.
    pub fn error(transaction_id: f64, properties: AmfValue, info: AmfValue) -> Self {
        Self::new(CMD_ERROR, transaction_id, properties).with_arguments(vec![info])
    }

    /// Builds an onStatus notification with the usual level, code and
    /// description fields.
    pub fn on_status(stream_id: u32, level: &str, code: &str, description: &str) -> Self {
        let info = AmfValue::object([
            ("level", AmfValue::from(level)),
            ("code", AmfValue::from(code)),
            ("description", AmfValue::from(description)),
        ]);
        Self::new(CMD_ON_STATUS, 0.0, AmfValue::Null)
            .with_arguments(vec![info])
            .with_stream_id(stream_id)
    }

    /// The status code carried by the information object, if any.
    ///
    /// Results, errors and onStatus notifications place an object with a
    /// "code" field in the first argument. Some servers put it in the
    /// command object instead, so both are checked.
    pub fn code(&self) -> Option<&str> {
        self.arguments
            .iter()
            .chain(std::iter::once(&self.command_object))
            .find_map(|value| value.get_string("code"))
    }

    /// The human readable description from the information object, if any.
    pub fn description(&self) -> Option<&str> {
        self.arguments
            .iter()
            .chain(std::iter::once(&self.command_object))
            .find_map(|value| value.get_string("description"))
    }
}

/// A data message such as @setDataFrame or onMetaData.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    /// Handler name
    pub name: String,
    /// Values following the handler name
    pub values: Vec<AmfValue>,
    /// Message stream id
    pub stream_id: u32,
    /// True when the message should be sent with the AMF3 envelope
    pub amf3: bool,
}

impl DataMessage {
    pub fn new(name: &str, values: Vec<AmfValue>, stream_id: u32) -> Self {
        Self {
            name: name.to_string(),
            values,
            stream_id,
            amf3: false,
        }
    }

    /// The metadata object for @setDataFrame and onMetaData messages.
    ///
    /// @setDataFrame wraps the real handler name and object in its values,
    /// onMetaData carries the object directly.
    pub fn metadata(&self) -> Option<&AmfValue> {
        self.values.iter().find(|v| v.as_object().is_some())
    }
}

/// Parameters of a connect command object.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    /// Application name the publisher dialed
    pub app: String,
    /// Encoder version string
    pub flash_ver: Option<String>,
    /// Full RTMP URL the peer dialed
    pub tc_url: Option<String>,
    /// 0 for AMF0, 3 for AMF3
    pub object_encoding: f64,
    /// Remaining properties of the connect object
    pub extra: HashMap<String, AmfValue>,
}

impl ConnectParams {
    /// Extracts the well known fields from a connect command object.
    ///
    /// Key casing varies by encoder, so the lowercase spellings are
    /// accepted alongside the canonical ones.
    pub fn from_amf(obj: &AmfValue) -> Self {
        let mut params = Self::default();
        let Some(map) = obj.as_object() else {
            return params;
        };

        for (key, value) in map {
            let text = value.as_str();
            match key.as_str() {
                "app" => params.app = text.unwrap_or("").to_string(),
                "flashVer" | "flashver" => params.flash_ver = text.map(String::from),
                "tcUrl" | "tcurl" => params.tc_url = text.map(String::from),
                "objectEncoding" | "objectencoding" => {
                    params.object_encoding = value.as_number().unwrap_or(0.0);
                }
                _ => {
                    params.extra.insert(key.clone(), value.clone());
                }
            }
        }
        params
    }
}

/// Parameters of a publish command.
#[derive(Debug, Clone)]
pub struct PublishParams {
    /// Stream key
    pub stream_key: String,
    /// Publish type, "live", "record" or "append"
    pub publish_type: String,
    /// Message stream id the publish arrived on
    pub stream_id: u32,
}

impl PublishParams {
    pub fn from_command(cmd: &Command) -> Result<Self> {
        let stream_key = cmd
            .arguments
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProtocolError::MissingField("publish stream key".into()))?;
        let publish_type = cmd
            .arguments
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("live");
        Ok(Self {
            stream_key: stream_key.to_string(),
            publish_type: publish_type.to_string(),
            stream_id: cmd.stream_id,
        })
    }
}

fn take_u32(payload: &mut Bytes) -> Result<u32> {
    if payload.len() < 4 {
        return Err(ProtocolError::InvalidChunkHeader.into());
    }
    Ok(payload.get_u32())
}

fn take_u8(payload: &mut Bytes) -> Result<u8> {
    if payload.is_empty() {
        return Err(ProtocolError::InvalidChunkHeader.into());
    }
    Ok(payload.get_u8())
}

impl RtmpMessage {
    /// Parses a complete message out of a reassembled chunk.
    pub fn from_chunk(mut chunk: RtmpChunk) -> Result<Self> {
        let mut payload = chunk.take_payload();

        match chunk.message_type {
            // Top bit of the chunk size is reserved
            MSG_SET_CHUNK_SIZE => Ok(Self::SetChunkSize(take_u32(&mut payload)? & 0x7FFF_FFFF)),

            MSG_ABORT => Ok(Self::Abort {
                csid: take_u32(&mut payload)?,
            }),

            MSG_ACKNOWLEDGEMENT => Ok(Self::Acknowledgement {
                sequence: take_u32(&mut payload)?,
            }),

            MSG_USER_CONTROL => Self::parse_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => Ok(Self::WindowAckSize(take_u32(&mut payload)?)),

            MSG_SET_PEER_BANDWIDTH => {
                let size = take_u32(&mut payload)?;
                let limit_type = take_u8(&mut payload)?;
                Ok(Self::SetPeerBandwidth { size, limit_type })
            }

            MSG_AUDIO => Ok(Self::Audio {
                timestamp: chunk.timestamp,
                data: payload,
            }),

            MSG_VIDEO => Ok(Self::Video {
                timestamp: chunk.timestamp,
                data: payload,
            }),

            MSG_COMMAND_AMF0 => {
                Self::parse_command(&mut payload, chunk.stream_id, false).map(Self::Command)
            }

            MSG_COMMAND_AMF3 => {
                strip_amf3_envelope(&mut payload);
                Self::parse_command(&mut payload, chunk.stream_id, true).map(Self::Command)
            }

            MSG_DATA_AMF0 => {
                Self::parse_data(&mut payload, chunk.stream_id, false).map(Self::Data)
            }

            MSG_DATA_AMF3 => {
                strip_amf3_envelope(&mut payload);
                Self::parse_data(&mut payload, chunk.stream_id, true).map(Self::Data)
            }

            _ => Ok(Self::Unknown {
                type_id: chunk.message_type,
                data: payload,
            }),
        }
    }

    fn parse_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 2 {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }

        let event = match payload.get_u16() {
            UC_STREAM_BEGIN => UserControlEvent::StreamBegin(take_u32(payload)?),
            UC_STREAM_EOF => UserControlEvent::StreamEof(take_u32(payload)?),
            UC_SET_BUFFER_LENGTH => UserControlEvent::SetBufferLength {
                stream_id: take_u32(payload)?,
                buffer_ms: take_u32(payload)?,
            },
            UC_PING_REQUEST => UserControlEvent::PingRequest(take_u32(payload)?),
            UC_PING_RESPONSE => UserControlEvent::PingResponse(take_u32(payload)?),
            other => UserControlEvent::Unknown {
                event_type: other,
                data: payload.clone(),
            },
        };
        Ok(Self::UserControl(event))
    }

    fn parse_command(payload: &mut Bytes, stream_id: u32, amf3: bool) -> Result<Command> {
        let mut decoder = Amf0Decoder::new();

        let AmfValue::String(name) = decoder.decode(payload)? else {
            return Err(ProtocolError::InvalidCommand("missing command name".into()).into());
        };
        let transaction_id = decoder.decode(payload)?.as_number().unwrap_or(0.0);
        let command_object = if payload.has_remaining() {
            decoder.decode(payload)?
        } else {
            AmfValue::Null
        };

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments: decode_remaining(&mut decoder, payload)?,
            stream_id,
            amf3,
        })
    }

    fn parse_data(payload: &mut Bytes, stream_id: u32, amf3: bool) -> Result<DataMessage> {
        let mut decoder = Amf0Decoder::new();

        let name = match decoder.decode(payload)? {
            AmfValue::String(s) => s,
            _ => String::new(),
        };

        Ok(DataMessage {
            name,
            values: decode_remaining(&mut decoder, payload)?,
            stream_id,
            amf3,
        })
    }

    /// Serializes the message body, returning the type id and payload.
    pub fn encode(&self) -> (u8, Bytes) {
        match self {
            Self::SetChunkSize(size) => (MSG_SET_CHUNK_SIZE, u32_payload(*size)),

            Self::Abort { csid } => (MSG_ABORT, u32_payload(*csid)),

            Self::Acknowledgement { sequence } => (MSG_ACKNOWLEDGEMENT, u32_payload(*sequence)),

            Self::WindowAckSize(size) => (MSG_WINDOW_ACK_SIZE, u32_payload(*size)),

            Self::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }

            Self::UserControl(event) => (MSG_USER_CONTROL, event.encode()),

            Self::Audio { data, .. } => (MSG_AUDIO, data.clone()),

            Self::Video { data, .. } => (MSG_VIDEO, data.clone()),

            Self::Command(cmd) => {
                let body = encode_command(cmd);
                if cmd.amf3 {
                    (MSG_COMMAND_AMF3, with_amf3_envelope(&body))
                } else {
                    (MSG_COMMAND_AMF0, body)
                }
            }

            Self::Data(data) => {
                let body = encode_data(data);
                if data.amf3 {
                    (MSG_DATA_AMF3, with_amf3_envelope(&body))
                } else {
                    (MSG_DATA_AMF0, body)
                }
            }

            Self::Unknown { type_id, data } => (*type_id, data.clone()),
        }
    }

    /// Serializes the message into a chunk ready for the wire.
    pub fn to_chunk(&self, csid: u32, timestamp: u32, stream_id: u32) -> RtmpChunk {
        let (message_type, payload) = self.encode();
        RtmpChunk::new(csid, timestamp, message_type, stream_id, &payload)
    }
}

/// Decodes values until the payload runs out, tolerating a trailing
/// truncated value the way other servers do.
fn decode_remaining(decoder: &mut Amf0Decoder, payload: &mut Bytes) -> Result<Vec<AmfValue>> {
    let mut values = Vec::new();
    while payload.has_remaining() {
        match decoder.decode(payload) {
            Ok(value) => values.push(value),
            Err(AmfError::UnexpectedEof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(values)
}

fn u32_payload(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// Drops the 0x00 byte AMF3 command and data messages are wrapped in.
fn strip_amf3_envelope(payload: &mut Bytes) {
    if payload.first() == Some(&0x00) {
        payload.advance(1);
    }
}

fn with_amf3_envelope(body: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_u8(0x00);
    buf.put_slice(body);
    buf.freeze()
}

fn encode_command(cmd: &Command) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(cmd.name.clone()));
    encoder.encode(&AmfValue::Number(cmd.transaction_id));
    encoder.encode(&cmd.command_object);
    encoder.encode_all(&cmd.arguments);
    encoder.finish()
}

fn encode_data(data: &DataMessage) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(data.name.clone()));
    encoder.encode_all(&data.values);
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &RtmpMessage) -> RtmpMessage {
        let chunk = message.to_chunk(CSID_COMMAND, 0, 0);
        RtmpMessage::from_chunk(chunk).unwrap()
    }

    #[test]
    fn chunk_size_roundtrip() {
        match roundtrip(&RtmpMessage::SetChunkSize(4096)) {
            RtmpMessage::SetChunkSize(size) => assert_eq!(size, 4096),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn chunk_size_reserved_bit_is_masked() {
        let chunk = RtmpChunk::new(
            CSID_PROTOCOL_CONTROL,
            0,
            MSG_SET_CHUNK_SIZE,
            0,
            &[0x80, 0x00, 0x10, 0x00],
        );
        match RtmpMessage::from_chunk(chunk).unwrap() {
            RtmpMessage::SetChunkSize(size) => assert_eq!(size, 0x1000),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn truncated_control_message_rejected() {
        let chunk = RtmpChunk::new(CSID_PROTOCOL_CONTROL, 0, MSG_WINDOW_ACK_SIZE, 0, &[0x00, 0x01]);
        assert!(RtmpMessage::from_chunk(chunk).is_err());
    }

    #[test]
    fn peer_bandwidth_roundtrip() {
        let message = RtmpMessage::SetPeerBandwidth {
            size: 2_500_000,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        };
        match roundtrip(&message) {
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                assert_eq!(size, 2_500_000);
                assert_eq!(limit_type, BANDWIDTH_LIMIT_DYNAMIC);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn stream_begin_wire_format() {
        let message = RtmpMessage::UserControl(UserControlEvent::StreamBegin(1));
        let (type_id, payload) = message.encode();
        assert_eq!(type_id, MSG_USER_CONTROL);
        assert_eq!(&payload[..], &[0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);

        match roundtrip(&message) {
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(id)) => assert_eq!(id, 1),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_user_control_event_preserved() {
        let chunk = RtmpChunk::new(
            CSID_PROTOCOL_CONTROL,
            0,
            MSG_USER_CONTROL,
            0,
            &[0x00, 0x02, 0x00, 0x00, 0x00, 0x07],
        );
        match RtmpMessage::from_chunk(chunk).unwrap() {
            RtmpMessage::UserControl(UserControlEvent::Unknown { event_type, data }) => {
                assert_eq!(event_type, 2);
                assert_eq!(&data[..], &[0x00, 0x00, 0x00, 0x07]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn command_roundtrip() {
        let cmd = Command::new("connect", 1.0, AmfValue::object([("app", AmfValue::from("live"))]))
            .with_arguments(vec![AmfValue::from("token")]);
        match roundtrip(&RtmpMessage::Command(cmd)) {
            RtmpMessage::Command(parsed) => {
                assert_eq!(parsed.name, "connect");
                assert_eq!(parsed.transaction_id, 1.0);
                assert_eq!(parsed.command_object.get_string("app"), Some("live"));
                assert_eq!(parsed.arguments.len(), 1);
                assert!(!parsed.amf3);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn amf3_envelope_wraps_plain_amf0() {
        let mut cmd = Command::new("onStatus", 0.0, AmfValue::Null);
        cmd.amf3 = true;
        let message = RtmpMessage::Command(cmd);
        let (type_id, payload) = message.encode();
        assert_eq!(type_id, MSG_COMMAND_AMF3);
        assert_eq!(payload[0], 0x00);
        assert_eq!(payload[1], 0x02); // AMF0 string marker follows the envelope

        let chunk = RtmpChunk::new(CSID_COMMAND, 0, MSG_COMMAND_AMF3, 0, &payload);
        match RtmpMessage::from_chunk(chunk).unwrap() {
            RtmpMessage::Command(parsed) => {
                assert_eq!(parsed.name, "onStatus");
                assert!(parsed.amf3);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn on_status_carries_code() {
        let cmd = Command::on_status(1, "status", NS_PUBLISH_START, "Stream is now published");
        assert_eq!(cmd.code(), Some(NS_PUBLISH_START));
        assert_eq!(cmd.description(), Some("Stream is now published"));
        match roundtrip(&RtmpMessage::Command(cmd)) {
            RtmpMessage::Command(parsed) => {
                assert_eq!(parsed.name, CMD_ON_STATUS);
                assert_eq!(parsed.code(), Some(NS_PUBLISH_START));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn result_code_from_first_argument() {
        let info = AmfValue::object([
            ("level", AmfValue::from("status")),
            ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
        ]);
        let cmd = Command::result(1.0, AmfValue::Null, info);
        assert_eq!(cmd.code(), Some(NC_CONNECT_SUCCESS));
    }

    #[test]
    fn data_message_roundtrip() {
        let metadata = AmfValue::object([
            ("width", AmfValue::from(1280.0)),
            ("height", AmfValue::from(720.0)),
        ]);
        let data = DataMessage::new(
            CMD_SET_DATA_FRAME,
            vec![AmfValue::from(CMD_ON_METADATA), metadata],
            1,
        );
        match roundtrip(&RtmpMessage::Data(data)) {
            RtmpMessage::Data(parsed) => {
                assert_eq!(parsed.name, CMD_SET_DATA_FRAME);
                assert_eq!(parsed.values.len(), 2);
                let meta = parsed.metadata().unwrap();
                assert_eq!(meta.get_number("width"), Some(1280.0));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn connect_params_pick_known_fields() {
        let obj = AmfValue::object([
            ("app", AmfValue::from("live")),
            ("tcUrl", AmfValue::from("rtmp://localhost/live")),
            ("objectEncoding", AmfValue::from(0.0)),
            ("type", AmfValue::from("nonprivate")),
        ]);
        let params = ConnectParams::from_amf(&obj);
        assert_eq!(params.app, "live");
        assert_eq!(params.tc_url.as_deref(), Some("rtmp://localhost/live"));
        assert_eq!(params.object_encoding, 0.0);
        assert_eq!(
            params.extra.get("type").and_then(|v| v.as_str()),
            Some("nonprivate")
        );
    }

    #[test]
    fn publish_params_require_stream_key() {
        let cmd = Command::new("publish", 5.0, AmfValue::Null)
            .with_arguments(vec![AmfValue::from("stream-key"), AmfValue::from("live")])
            .with_stream_id(1);
        let params = PublishParams::from_command(&cmd).unwrap();
        assert_eq!(params.stream_key, "stream-key");
        assert_eq!(params.publish_type, "live");
        assert_eq!(params.stream_id, 1);

        let bad = Command::new("publish", 5.0, AmfValue::Null);
        assert!(PublishParams::from_command(&bad).is_err());
    }

    #[test]
    fn audio_passthrough_keeps_timestamp() {
        let data = Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10]);
        let chunk = RtmpChunk::new(CSID_DATA, 640, MSG_AUDIO, 1, &data);
        match RtmpMessage::from_chunk(chunk).unwrap() {
            RtmpMessage::Audio { timestamp, data: body } => {
                assert_eq!(timestamp, 640);
                assert_eq!(body, data);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_preserved() {
        let chunk = RtmpChunk::new(CSID_PROTOCOL_CONTROL, 0, 99, 0, &[1, 2, 3]);
        match RtmpMessage::from_chunk(chunk).unwrap() {
            RtmpMessage::Unknown { type_id, data } => {
                assert_eq!(type_id, 99);
                assert_eq!(&data[..], &[1, 2, 3]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
