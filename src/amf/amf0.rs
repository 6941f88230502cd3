//! AMF0 encoder and decoder.
//!
//! AMF0 is the serialization format RTMP command messages are written
//! in: a one-byte type marker followed by the value. The `marker`
//! module lists the byte values. Strings come in two widths, a 16-bit
//! length prefix under marker 0x02 and a 32-bit one under 0x0C; objects
//! are key-value pairs closed by an empty key plus the object end
//! marker.
//!
//! Reference (0x07), MovieClip (0x04), RecordSet (0x0E) and AVM+ (0x11)
//! markers are not produced by RTMP encoders we talk to and are rejected
//! as unknown.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::AmfError;

mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
    pub const UNSUPPORTED: u8 = 0x0D;
    pub const XML_DOCUMENT: u8 = 0x0F;
    pub const TYPED_OBJECT: u8 = 0x10;
}

/// Recursion ceiling for nested objects and arrays.
const MAX_NESTING_DEPTH: usize = 64;

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

fn take_string(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    need(buf, len)?;
    String::from_utf8(buf.copy_to_bytes(len).to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// UTF-8 string with a 16-bit length prefix, as used for keys and short strings.
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    take_string(buf, len)
}

/// UTF-8 string with a 32-bit length prefix (long strings, XML documents).
fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    need(buf, 4)?;
    let len = buf.get_u32() as usize;
    take_string(buf, len)
}

/// AMF0 decoder.
///
/// Lenient mode tolerates the quirks of real encoders: unknown markers
/// decode as `Undefined` and a property list may end at the buffer edge
/// without its end marker. OBS produces both, so lenient is the default.
pub struct Amf0Decoder {
    lenient: bool,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self { lenient: true }
    }

    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient }
    }

    /// Decode one value, consuming its bytes from `buf`.
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        self.decode_at(buf, 0)
    }

    /// Decode values until `buf` runs out.
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_at(&mut self, buf: &mut Bytes, depth: usize) -> Result<AmfValue, AmfError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }
        need(buf, 1)?;

        match buf.get_u8() {
            marker::NUMBER => {
                need(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            marker::BOOLEAN => {
                need(buf, 1)?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            marker::STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            marker::OBJECT => Ok(AmfValue::Object(self.read_properties(buf, depth)?)),
            marker::NULL => Ok(AmfValue::Null),
            marker::UNDEFINED | marker::UNSUPPORTED => Ok(AmfValue::Undefined),
            marker::ECMA_ARRAY => {
                // The count is a hint; the terminator still ends the list
                need(buf, 4)?;
                buf.advance(4);
                Ok(AmfValue::EcmaArray(self.read_properties(buf, depth)?))
            }
            marker::STRICT_ARRAY => {
                need(buf, 4)?;
                let count = buf.get_u32() as usize;
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode_at(buf, depth + 1)?);
                }
                Ok(AmfValue::Array(elements))
            }
            marker::DATE => {
                need(buf, 10)?;
                let millis = buf.get_f64();
                buf.advance(2); // timezone, deprecated
                Ok(AmfValue::Date(millis))
            }
            marker::LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            marker::XML_DOCUMENT => Ok(AmfValue::Xml(read_utf8_long(buf)?)),
            marker::TYPED_OBJECT => Ok(AmfValue::TypedObject {
                class_name: read_utf8(buf)?,
                properties: self.read_properties(buf, depth)?,
            }),
            _ if self.lenient => Ok(AmfValue::Undefined),
            unknown => Err(AmfError::UnknownMarker(unknown)),
        }
    }

    /// Key-value pairs terminated by an empty key plus the end marker.
    ///
    /// Shared by Object, ECMA Array and Typed Object, which all use the
    /// same property framing on the wire.
    fn read_properties(
        &mut self,
        buf: &mut Bytes,
        depth: usize,
    ) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();
        loop {
            let key = read_utf8(buf)?;
            if !key.is_empty() {
                properties.insert(key, self.decode_at(buf, depth + 1)?);
                continue;
            }

            // Empty key: the end marker should follow
            if buf.is_empty() {
                if self.lenient {
                    break;
                }
                return Err(AmfError::UnexpectedEof);
            }
            match buf.get_u8() {
                marker::OBJECT_END => break,
                _ if self.lenient => break,
                _ => return Err(AmfError::InvalidObjectEnd),
            }
        }
        Ok(properties)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder accumulating into an internal buffer.
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Take the encoded bytes, leaving the encoder empty for reuse.
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one value to the pending buffer.
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.buf.put_u8(marker::NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(marker::BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::String(s) if s.len() > 0xFFFF => {
                self.buf.put_u8(marker::LONG_STRING);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::String(s) => {
                self.buf.put_u8(marker::STRING);
                self.put_utf8(s);
            }
            AmfValue::Object(properties) => {
                self.buf.put_u8(marker::OBJECT);
                self.put_properties(properties);
            }
            AmfValue::Null => self.buf.put_u8(marker::NULL),
            AmfValue::Undefined => self.buf.put_u8(marker::UNDEFINED),
            AmfValue::EcmaArray(properties) => {
                self.buf.put_u8(marker::ECMA_ARRAY);
                self.buf.put_u32(properties.len() as u32);
                self.put_properties(properties);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(marker::STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for element in elements {
                    self.encode(element);
                }
            }
            AmfValue::Date(millis) => {
                self.buf.put_u8(marker::DATE);
                self.buf.put_f64(*millis);
                self.buf.put_i16(0); // timezone, deprecated
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(marker::XML_DOCUMENT);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(marker::TYPED_OBJECT);
                self.put_utf8(class_name);
                self.put_properties(properties);
            }
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn put_properties(&mut self, properties: &HashMap<String, AmfValue>) {
        for (key, value) in properties {
            self.put_utf8(key);
            self.encode(value);
        }
        // Empty key plus the end marker
        self.buf.put_u16(0);
        self.buf.put_u8(marker::OBJECT_END);
    }

    /// 16-bit length-prefixed UTF-8, no type marker. Oversized keys are cut.
    fn put_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Encode a sequence of values into a fresh buffer.
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Decode a single value with a lenient decoder.
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode(&mut buf)
}

/// Decode all values with a lenient decoder.
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_wire_formats() {
        assert_eq!(
            encode(&AmfValue::Number(1.0)).as_ref(),
            &[0x00, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            encode(&AmfValue::String("live".into())).as_ref(),
            &[0x02, 0x00, 0x04, b'l', b'i', b'v', b'e']
        );
        assert_eq!(encode(&AmfValue::Boolean(true)).as_ref(), &[0x01, 0x01]);
        assert_eq!(encode(&AmfValue::Boolean(false)).as_ref(), &[0x01, 0x00]);
        assert_eq!(encode(&AmfValue::Null).as_ref(), &[0x05]);
        assert_eq!(encode(&AmfValue::Undefined).as_ref(), &[0x06]);
    }

    #[test]
    fn single_key_object_wire_format() {
        let encoded = encode(&AmfValue::object([("app", AmfValue::from("live"))]));
        assert_eq!(
            encoded.as_ref(),
            &[
                0x03, // object
                0x00, 0x03, b'a', b'p', b'p', // key
                0x02, 0x00, 0x04, b'l', b'i', b'v', b'e', // value
                0x00, 0x00, 0x09, // end sequence
            ]
        );
    }

    #[test]
    fn roundtrips_preserve_values() {
        let samples = [
            AmfValue::Number(-12.25),
            AmfValue::Date(1700000000000.0),
            AmfValue::Xml("<r/>".into()),
            AmfValue::String(String::new()),
            AmfValue::Array(vec![
                AmfValue::Number(1.0),
                AmfValue::String("two".into()),
                AmfValue::Boolean(true),
            ]),
            AmfValue::Object(HashMap::new()),
            AmfValue::object([
                ("level", AmfValue::from("status")),
                ("code", AmfValue::from("NetStream.Publish.Start")),
            ]),
            AmfValue::TypedObject {
                class_name: "flash.Metadata".to_string(),
                properties: HashMap::from([("fps".to_string(), AmfValue::Number(30.0))]),
            },
        ];
        for value in samples {
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn command_sequence_roundtrip() {
        let values = vec![
            AmfValue::String("createStream".into()),
            AmfValue::Number(2.0),
            AmfValue::Null,
        ];
        assert_eq!(decode_all(&encode_all(&values)).unwrap(), values);
    }

    #[test]
    fn long_strings_use_the_wide_marker() {
        let s = "x".repeat(70000);
        let encoded = encode(&AmfValue::String(s.clone()));
        assert_eq!(encoded[0], 0x0C);
        assert_eq!(decode(&encoded).unwrap(), AmfValue::String(s));
    }

    #[test]
    fn ecma_array_roundtrip_ignores_length_hint() {
        let metadata = AmfValue::EcmaArray(HashMap::from([
            ("width".to_string(), AmfValue::Number(1920.0)),
            ("height".to_string(), AmfValue::Number(1080.0)),
        ]));
        assert_eq!(decode(&encode(&metadata)).unwrap(), metadata);

        // A lying count does not matter, the terminator ends the list
        let mut wire = vec![0x08, 0x00, 0x00, 0x00, 0x09];
        wire.extend_from_slice(&[0x00, 0x01, b'a', 0x01, 0x01]);
        wire.extend_from_slice(&[0x00, 0x00, 0x09]);
        assert_eq!(
            decode(&wire).unwrap().get("a"),
            Some(&AmfValue::Boolean(true))
        );
    }

    #[test]
    fn nested_object_lookup() {
        let value = AmfValue::object([
            (
                "data",
                AmfValue::object([("code", AmfValue::from("NetConnection.Connect.Success"))]),
            ),
            ("transaction", AmfValue::from(1.0)),
        ]);
        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(
            decoded.get("data").and_then(|d| d.get_string("code")),
            Some("NetConnection.Connect.Success")
        );
    }

    #[test]
    fn special_floats_survive() {
        assert!(matches!(
            decode(&encode(&AmfValue::Number(f64::NAN))).unwrap(),
            AmfValue::Number(n) if n.is_nan()
        ));
        assert_eq!(
            decode(&encode(&AmfValue::Number(f64::INFINITY))).unwrap(),
            AmfValue::Number(f64::INFINITY)
        );
    }

    #[test]
    fn truncated_input_reports_eof() {
        // empty buffer, cut number, string shorter than its prefix claims
        for wire in [&[][..], &[0x00, 0x40, 0x45][..], &[0x02, 0x00, 0x10][..]] {
            assert!(matches!(decode(wire), Err(AmfError::UnexpectedEof)));
        }
    }

    #[test]
    fn lenient_accepts_missing_object_end() {
        let mut wire = vec![0x03, 0x00, 0x01, b'a', 0x00];
        wire.extend_from_slice(&1.0f64.to_be_bytes());
        wire.extend_from_slice(&[0x00, 0x00]); // empty key, then EOF instead of 0x09

        assert_eq!(decode(&wire).unwrap().get_number("a"), Some(1.0));

        let mut strict = Amf0Decoder::with_lenient(false);
        let mut buf = Bytes::copy_from_slice(&wire);
        assert!(matches!(
            strict.decode(&mut buf),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn unknown_marker_handling_depends_on_mode() {
        assert_eq!(decode(&[0xFF]).unwrap(), AmfValue::Undefined);

        let mut strict = Amf0Decoder::with_lenient(false);
        let mut buf = Bytes::from_static(&[0xFF]);
        assert!(matches!(
            strict.decode(&mut buf),
            Err(AmfError::UnknownMarker(0xFF))
        ));

        // Reference marker is deliberately unsupported
        let mut buf = Bytes::from_static(&[0x07, 0x00, 0x00]);
        assert!(matches!(
            strict.decode(&mut buf),
            Err(AmfError::UnknownMarker(0x07))
        ));
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut value = AmfValue::Object(HashMap::new());
        for _ in 0..70 {
            value = AmfValue::Object(HashMap::from([("inner".to_string(), value)]));
        }
        assert!(matches!(
            decode(&encode(&value)),
            Err(AmfError::NestingTooDeep)
        ));
    }

    #[test]
    fn encoder_buffer_can_be_reused() {
        let mut encoder = Amf0Encoder::new();
        encoder.encode(&AmfValue::Null);
        assert_eq!(encoder.len(), 1);
        assert_eq!(encoder.finish().as_ref(), &[0x05]);
        assert!(encoder.is_empty());

        encoder.encode(&AmfValue::Boolean(true));
        assert_eq!(encoder.finish().as_ref(), &[0x01, 0x01]);
    }

    #[test]
    fn connect_command_shape() {
        let values = vec![
            AmfValue::String("connect".into()),
            AmfValue::Number(1.0),
            AmfValue::object([
                ("app", AmfValue::from("live")),
                ("flashVer", AmfValue::from("FMLE/3.0 (compatible; FMSc/1.0)")),
                ("tcUrl", AmfValue::from("rtmp://localhost/live")),
                ("fpad", AmfValue::from(false)),
                ("audioCodecs", AmfValue::from(3575.0)),
                ("videoCodecs", AmfValue::from(252.0)),
                ("objectEncoding", AmfValue::from(0.0)),
            ]),
        ];

        let decoded = decode_all(&encode_all(&values)).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], AmfValue::String("connect".into()));
        assert_eq!(decoded[1], AmfValue::Number(1.0));
        assert_eq!(decoded[2].get_string("app"), Some("live"));
        assert_eq!(decoded[2].get_number("audioCodecs"), Some(3575.0));
    }
}
