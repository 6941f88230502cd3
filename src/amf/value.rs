//! The AMF value model.
//!
//! Command payloads on the wire are AMF0. This enum models the value
//! types that format carries, with accessors shaped for pulling fields
//! out of command objects.

use std::collections::HashMap;

/// AMF0 value representation, variants in wire marker order.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double-precision floating point (0x00)
    Number(f64),

    /// Boolean value (0x01)
    Boolean(bool),

    /// UTF-8 string (0x02, or 0x0C when longer than 65535 bytes)
    String(String),

    /// Key-value object (0x03); keys are always strings
    Object(HashMap<String, AmfValue>),

    /// Null value (0x05)
    Null,

    /// Undefined value (0x06)
    Undefined,

    /// Associative array with a length hint (0x08), used by onMetaData
    EcmaArray(HashMap<String, AmfValue>),

    /// Dense array, StrictArray on the wire (0x0A)
    Array(Vec<AmfValue>),

    /// Date value as milliseconds since the Unix epoch (0x0B)
    Date(f64),

    /// XML document (0x0F)
    Xml(String),

    /// Typed object with class name (0x10)
    TypedObject {
        class_name: String,
        properties: HashMap<String, AmfValue>,
    },
}

impl AmfValue {
    /// Build an object value from key-value pairs
    pub fn object<K, I>(entries: I) -> AmfValue
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, AmfValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a property on an object-like value.
    ///
    /// Works on objects, ECMA arrays and typed objects alike, which is
    /// what command objects and onMetaData payloads arrive as.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    /// Look up a string property on an object-like value.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Look up a numeric property on an object-like value.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// The numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        if let Self::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// The property map of any object-like value.
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            Self::Object(m) | Self::EcmaArray(m) => Some(m),
            Self::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for AmfValue {
    fn from(v: i32) -> Self {
        Self::Number(v.into())
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        Self::Number(v.into())
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
