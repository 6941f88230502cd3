//! Action Message Format support
//!
//! This module provides:
//! - A value model for AMF0 payloads
//! - AMF0 encoding and decoding with a lenient mode for encoder quirks
//!
//! RTMP command messages are AMF0. Messages flagged as AMF3 on the wire
//! (type ids 0x11/0x0F) carry one leading zero byte and then AMF0 data;
//! the message layer strips that byte, so no AMF3 value codec lives here.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
