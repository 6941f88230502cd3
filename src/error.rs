//! Error types shared across the crate.
//!
//! One [`Error`] enum wraps the per-layer error types so async tasks can
//! bubble everything through a single [`Result`]. The layer enums stay
//! public because tests and callers match on the concrete failure.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure a connection or codec can produce.
#[derive(Debug)]
pub enum Error {
    /// Socket level failure
    Io(io::Error),
    /// Peer violated RTMP chunking or messaging rules
    Protocol(ProtocolError),
    /// Malformed AMF payload
    Amf(AmfError),
    /// Version negotiation went wrong
    Handshake(HandshakeError),
    /// Malformed FLV tag or codec configuration
    Media(MediaError),
    /// MPEG-TS packetization failure
    MpegTs(MpegTsError),
    /// Peer refused the connection or the publish
    Rejected(String),
    /// A phase did not finish within its deadline
    Timeout,
    /// Peer hung up
    ConnectionClosed,
    /// Bad configuration value
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Amf(e) => write!(f, "AMF error: {e}"),
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
            Self::Media(e) => write!(f, "media error: {e}"),
            Self::MpegTs(e) => write!(f, "MPEG-TS error: {e}"),
            Self::Rejected(reason) => write!(f, "rejected by peer: {reason}"),
            Self::Timeout => f.write_str("timed out"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::Config(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Amf(e) => Some(e),
            Self::Handshake(e) => Some(e),
            Self::Media(e) => Some(e),
            Self::MpegTs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Self::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Self::Handshake(err)
    }
}

impl From<MediaError> for Error {
    fn from(err: MediaError) -> Self {
        Self::Media(err)
    }
}

impl From<MpegTsError> for Error {
    fn from(err: MpegTsError) -> Self {
        Self::MpegTs(err)
    }
}

/// Chunking and messaging violations.
#[derive(Debug)]
pub enum ProtocolError {
    InvalidChunkHeader,
    /// Basic header width the server state machine does not accept
    UnsupportedBasicHeader(u8),
    MessageTooLarge { size: u32, max: u32 },
    UnexpectedMessage(String),
    MissingField(String),
    InvalidCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChunkHeader => f.write_str("invalid chunk header"),
            Self::UnsupportedBasicHeader(n) => {
                write!(f, "{n} bytes basic header is not implemented")
            }
            Self::MessageTooLarge { size, max } => {
                write!(f, "{size} byte message exceeds the {max} byte limit")
            }
            Self::UnexpectedMessage(what) => write!(f, "unexpected message: {what}"),
            Self::MissingField(field) => write!(f, "missing field: {field}"),
            Self::InvalidCommand(name) => write!(f, "invalid command: {name}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF0 decode failures.
#[derive(Debug)]
pub enum AmfError {
    UnknownMarker(u8),
    UnexpectedEof,
    InvalidUtf8,
    NestingTooDeep,
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMarker(m) => write!(f, "unknown marker 0x{m:02x}"),
            Self::UnexpectedEof => f.write_str("value runs past the end of the payload"),
            Self::InvalidUtf8 => f.write_str("string is not valid UTF-8"),
            Self::NestingTooDeep => f.write_str("values nested too deep"),
            Self::InvalidObjectEnd => f.write_str("malformed object end sequence"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake failures.
#[derive(Debug)]
pub enum HandshakeError {
    InvalidVersion(u8),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion(v) => {
                write!(f, "only version 3 is supported, not {v}")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// FLV tag and codec configuration failures.
#[derive(Debug)]
pub enum MediaError {
    InvalidVideoTag,
    InvalidAudioTag,
    InvalidAvcConfig,
    InvalidHevcConfig,
    InvalidAacConfig,
    InvalidAdtsFrame,
    InvalidNalu,
    UnsupportedCodec(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVideoTag => f.write_str("malformed video tag"),
            Self::InvalidAudioTag => f.write_str("malformed audio tag"),
            Self::InvalidAvcConfig => f.write_str("malformed AVC configuration record"),
            Self::InvalidHevcConfig => f.write_str("malformed HEVC configuration record"),
            Self::InvalidAacConfig => f.write_str("malformed AudioSpecificConfig"),
            Self::InvalidAdtsFrame => f.write_str("malformed ADTS frame"),
            Self::InvalidNalu => f.write_str("NAL unit runs past its buffer"),
            Self::UnsupportedCodec(codec) => write!(f, "unsupported codec: {codec}"),
        }
    }
}

impl std::error::Error for MediaError {}

/// PES packetization failures.
#[derive(Debug)]
pub enum MpegTsError {
    BadStartCode,
    PayloadTooLarge(usize),
    TruncatedHeader,
}

impl fmt::Display for MpegTsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStartCode => f.write_str("bad PES start code"),
            Self::PayloadTooLarge(n) => {
                write!(f, "{n} byte payload does not fit a bounded PES packet")
            }
            Self::TruncatedHeader => f.write_str("truncated PES header"),
        }
    }
}

impl std::error::Error for MpegTsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn display_includes_layer_and_detail() {
        let err = Error::from(ProtocolError::MessageTooLarge {
            size: 20_000_000,
            max: 16_777_216,
        });
        assert_eq!(
            err.to_string(),
            "protocol error: 20000000 byte message exceeds the 16777216 byte limit"
        );

        assert_eq!(
            Error::from(AmfError::UnknownMarker(0xFF)).to_string(),
            "AMF error: unknown marker 0xff"
        );
        assert_eq!(
            Error::Rejected("authmod required".into()).to_string(),
            "rejected by peer: authmod required"
        );
        assert_eq!(Error::Timeout.to_string(), "timed out");
    }

    #[test]
    fn basic_header_width_message() {
        // Wording matches the teardown reason publishers see for csid 0 and 1
        assert_eq!(
            ProtocolError::UnsupportedBasicHeader(2).to_string(),
            "2 bytes basic header is not implemented"
        );
    }

    #[test]
    fn sources_chain_to_the_layer_error() {
        let err = Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.source().is_some());

        let err = Error::from(HandshakeError::InvalidVersion(6));
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("only version 3 is supported, not 6".to_string())
        );

        assert!(Error::ConnectionClosed.source().is_none());
    }

    #[test]
    fn from_wraps_each_layer() {
        assert!(matches!(
            Error::from(MediaError::InvalidNalu),
            Error::Media(_)
        ));
        assert!(matches!(
            Error::from(MpegTsError::TruncatedHeader),
            Error::MpegTs(_)
        ));
        assert!(matches!(
            Error::from(AmfError::UnexpectedEof),
            Error::Amf(_)
        ));
    }
}
