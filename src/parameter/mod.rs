// celchp: Microarray CEL and CHP file conversion between formats.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Typed name/value parameters.
//!
//! A [ParameterNameValue] is the unit of metadata in the container format
//! headers. The value is a tagged union ([ParameterValue]) and the tag
//! determines both the byte width of the stored value and the MIME type
//! written next to it.
//!
//! Reading a value through an accessor of the wrong type returns None.
//! Every value can be converted to its canonical string form with
//! [ToString], which is what the legacy formats store.
//!
//! ## Usage
//!
//! ```rust
//! use celchp::parameter::{ParameterNameValue, ParameterType};
//!
//! let mut param = ParameterNameValue::new("CellMargin");
//! param.set_value_int32(2);
//!
//! assert_eq!(param.parameter_type(), ParameterType::Int32);
//! assert_eq!(param.value_int32(), Some(2));
//! assert_eq!(param.value_float(), None);
//! assert_eq!(param.to_string(), "2");
//! ```
//!
use bincode::de::Decoder;
use bincode::enc::write::Writer;
use bincode::enc::Encoder;
use bincode::error::DecodeError;
use bincode::error::EncodeError;
use bincode::Decode;
use bincode::Encode;

use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice;

use crate::codec::decode_bytes;
use crate::codec::WideString;
use crate::codec::widen;

pub const MIME_INT8: &str = "text/x-calvin-integer-8";
pub const MIME_UINT8: &str = "text/x-calvin-unsigned-integer-8";
pub const MIME_INT16: &str = "text/x-calvin-integer-16";
pub const MIME_UINT16: &str = "text/x-calvin-unsigned-integer-16";
pub const MIME_INT32: &str = "text/x-calvin-integer-32";
pub const MIME_UINT32: &str = "text/x-calvin-unsigned-integer-32";
pub const MIME_FLOAT: &str = "text/x-calvin-float";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_ASCII: &str = "text/ascii";

/// Type tag of a [ParameterValue].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParameterType {
    Text,
    Ascii,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    #[default]
    Unknown,
}

/// Value of a parameter.
///
/// `Raw` holds values whose MIME type is not one of the known types. They
/// are carried through unchanged but stringify to an empty string.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Ascii(BString),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    Raw { mime: String, bytes: Vec<u8> },
}

impl Default for ParameterValue {
    fn default() -> Self {
        ParameterValue::Raw { mime: String::new(), bytes: Vec::new() }
    }
}

impl ParameterValue {
    pub fn parameter_type(&self) -> ParameterType {
        match self {
            ParameterValue::Text(_) => ParameterType::Text,
            ParameterValue::Ascii(_) => ParameterType::Ascii,
            ParameterValue::Int8(_) => ParameterType::Int8,
            ParameterValue::UInt8(_) => ParameterType::UInt8,
            ParameterValue::Int16(_) => ParameterType::Int16,
            ParameterValue::UInt16(_) => ParameterType::UInt16,
            ParameterValue::Int32(_) => ParameterType::Int32,
            ParameterValue::UInt32(_) => ParameterType::UInt32,
            ParameterValue::Float(_) => ParameterType::Float,
            ParameterValue::Raw { .. } => ParameterType::Unknown,
        }
    }

    /// MIME type written next to the value in the container format.
    pub fn mime_type(&self) -> &str {
        match self {
            ParameterValue::Text(_) => MIME_TEXT,
            ParameterValue::Ascii(_) => MIME_ASCII,
            ParameterValue::Int8(_) => MIME_INT8,
            ParameterValue::UInt8(_) => MIME_UINT8,
            ParameterValue::Int16(_) => MIME_INT16,
            ParameterValue::UInt16(_) => MIME_UINT16,
            ParameterValue::Int32(_) => MIME_INT32,
            ParameterValue::UInt32(_) => MIME_UINT32,
            ParameterValue::Float(_) => MIME_FLOAT,
            ParameterValue::Raw { mime, .. } => mime.as_str(),
        }
    }

    /// Value bytes as stored in the container format.
    ///
    /// Integers are sign or zero extended to 4 big-endian bytes, text is
    /// stored as big-endian UTF-16.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ParameterValue::Text(s) => s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect(),
            ParameterValue::Ascii(s) => s.to_vec(),
            ParameterValue::Int8(x) => (*x as i32).to_be_bytes().to_vec(),
            ParameterValue::UInt8(x) => (*x as u32).to_be_bytes().to_vec(),
            ParameterValue::Int16(x) => (*x as i32).to_be_bytes().to_vec(),
            ParameterValue::UInt16(x) => (*x as u32).to_be_bytes().to_vec(),
            ParameterValue::Int32(x) => x.to_be_bytes().to_vec(),
            ParameterValue::UInt32(x) => x.to_be_bytes().to_vec(),
            ParameterValue::Float(x) => x.to_be_bytes().to_vec(),
            ParameterValue::Raw { bytes, .. } => bytes.clone(),
        }
    }

    /// Interprets `bytes` according to `mime`.
    ///
    /// Numeric values shorter than 4 bytes and unknown MIME types are kept
    /// as [ParameterValue::Raw].
    pub fn from_bytes(
        mime: &str,
        bytes: &[u8],
    ) -> Self {
        let word: Option<[u8; 4]> = bytes.get(0..4).and_then(|b| b.try_into().ok());
        match (mime, word) {
            (MIME_TEXT, _) => {
                let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                let end = units.iter().position(|u| *u == 0).unwrap_or(units.len());
                ParameterValue::Text(String::from_utf16_lossy(&units[0..end]))
            },
            (MIME_ASCII, _) => {
                let end = bytes.find_byte(0).unwrap_or(bytes.len());
                ParameterValue::Ascii(BString::from(&bytes[0..end]))
            },
            (MIME_INT8, Some(w)) => ParameterValue::Int8(i32::from_be_bytes(w) as i8),
            (MIME_UINT8, Some(w)) => ParameterValue::UInt8(u32::from_be_bytes(w) as u8),
            (MIME_INT16, Some(w)) => ParameterValue::Int16(i32::from_be_bytes(w) as i16),
            (MIME_UINT16, Some(w)) => ParameterValue::UInt16(u32::from_be_bytes(w) as u16),
            (MIME_INT32, Some(w)) => ParameterValue::Int32(i32::from_be_bytes(w)),
            (MIME_UINT32, Some(w)) => ParameterValue::UInt32(u32::from_be_bytes(w)),
            (MIME_FLOAT, Some(w)) => ParameterValue::Float(f32::from_be_bytes(w)),
            _ => ParameterValue::Raw { mime: mime.to_string(), bytes: bytes.to_vec() },
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParameterValue::Text(s) => write!(f, "{}", s),
            ParameterValue::Ascii(s) => write!(f, "{}", widen(s)),
            ParameterValue::Int8(x) => write!(f, "{}", x),
            ParameterValue::UInt8(x) => write!(f, "{}", x),
            ParameterValue::Int16(x) => write!(f, "{}", x),
            ParameterValue::UInt16(x) => write!(f, "{}", x),
            ParameterValue::Int32(x) => write!(f, "{}", x),
            ParameterValue::UInt32(x) => write!(f, "{}", x),
            ParameterValue::Float(x) => write!(f, "{:.6}", x),
            ParameterValue::Raw { .. } => Ok(()),
        }
    }
}

/// Named, typed parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterNameValue {
    pub name: String,
    pub value: ParameterValue,
}

impl ParameterNameValue {
    /// Creates a parameter with no value set.
    pub fn new(name: &str) -> Self {
        ParameterNameValue { name: name.to_string(), value: ParameterValue::default() }
    }

    pub fn with_value(
        name: &str,
        value: ParameterValue,
    ) -> Self {
        ParameterNameValue { name: name.to_string(), value }
    }

    pub fn text(name: &str, value: &str) -> Self { Self::with_value(name, ParameterValue::Text(value.to_string())) }
    pub fn ascii(name: &str, value: &[u8]) -> Self { Self::with_value(name, ParameterValue::Ascii(BString::from(value))) }
    pub fn int8(name: &str, value: i8) -> Self { Self::with_value(name, ParameterValue::Int8(value)) }
    pub fn uint8(name: &str, value: u8) -> Self { Self::with_value(name, ParameterValue::UInt8(value)) }
    pub fn int16(name: &str, value: i16) -> Self { Self::with_value(name, ParameterValue::Int16(value)) }
    pub fn uint16(name: &str, value: u16) -> Self { Self::with_value(name, ParameterValue::UInt16(value)) }
    pub fn int32(name: &str, value: i32) -> Self { Self::with_value(name, ParameterValue::Int32(value)) }
    pub fn uint32(name: &str, value: u32) -> Self { Self::with_value(name, ParameterValue::UInt32(value)) }
    pub fn float(name: &str, value: f32) -> Self { Self::with_value(name, ParameterValue::Float(value)) }

    pub fn parameter_type(&self) -> ParameterType {
        self.value.parameter_type()
    }

    pub fn mime_type(&self) -> &str {
        self.value.mime_type()
    }

    pub fn set_value_text(&mut self, value: &str) { self.value = ParameterValue::Text(value.to_string()) }
    pub fn set_value_ascii(&mut self, value: &[u8]) { self.value = ParameterValue::Ascii(BString::from(value)) }
    pub fn set_value_int8(&mut self, value: i8) { self.value = ParameterValue::Int8(value) }
    pub fn set_value_uint8(&mut self, value: u8) { self.value = ParameterValue::UInt8(value) }
    pub fn set_value_int16(&mut self, value: i16) { self.value = ParameterValue::Int16(value) }
    pub fn set_value_uint16(&mut self, value: u16) { self.value = ParameterValue::UInt16(value) }
    pub fn set_value_int32(&mut self, value: i32) { self.value = ParameterValue::Int32(value) }
    pub fn set_value_uint32(&mut self, value: u32) { self.value = ParameterValue::UInt32(value) }
    pub fn set_value_float(&mut self, value: f32) { self.value = ParameterValue::Float(value) }

    pub fn value_text(&self) -> Option<&str> {
        if let ParameterValue::Text(s) = &self.value { Some(s) } else { None }
    }

    pub fn value_ascii(&self) -> Option<&BStr> {
        if let ParameterValue::Ascii(s) = &self.value { Some(s.as_bstr()) } else { None }
    }

    pub fn value_int8(&self) -> Option<i8> {
        if let ParameterValue::Int8(x) = self.value { Some(x) } else { None }
    }

    pub fn value_uint8(&self) -> Option<u8> {
        if let ParameterValue::UInt8(x) = self.value { Some(x) } else { None }
    }

    pub fn value_int16(&self) -> Option<i16> {
        if let ParameterValue::Int16(x) = self.value { Some(x) } else { None }
    }

    pub fn value_uint16(&self) -> Option<u16> {
        if let ParameterValue::UInt16(x) = self.value { Some(x) } else { None }
    }

    pub fn value_int32(&self) -> Option<i32> {
        if let ParameterValue::Int32(x) = self.value { Some(x) } else { None }
    }

    pub fn value_uint32(&self) -> Option<u32> {
        if let ParameterValue::UInt32(x) = self.value { Some(x) } else { None }
    }

    pub fn value_float(&self) -> Option<f32> {
        if let ParameterValue::Float(x) = self.value { Some(x) } else { None }
    }
}

impl std::fmt::Display for ParameterNameValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Encode for ParameterNameValue {
    fn encode<En: Encoder>(
        &self,
        encoder: &mut En,
    ) -> Result<(), EncodeError> {
        WideString(self.name.clone()).encode(encoder)?;
        let bytes = self.value.to_bytes();
        (bytes.len() as i32).encode(encoder)?;
        encoder.writer().write(&bytes)?;
        WideString(self.value.mime_type().to_string()).encode(encoder)
    }
}

impl<Context> Decode<Context> for ParameterNameValue {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let name = WideString::decode(decoder)?;
        let len = i32::decode(decoder)?;
        if len < 0 {
            return Err(DecodeError::OtherString(format!("negative value length {} for parameter {}", len, name.0)))
        }
        let bytes = decode_bytes(decoder, len as usize)?;
        let mime = WideString::decode(decoder)?;
        Ok(ParameterNameValue { name: name.0, value: ParameterValue::from_bytes(&mime.0, &bytes) })
    }
}
bincode::impl_borrow_decode!(ParameterNameValue);

/// Returns the first parameter in `params` called `name`.
pub fn find_param<'a>(
    params: &'a [ParameterNameValue],
    name: &str,
) -> Option<&'a ParameterNameValue> {
    params.iter().find(|p| p.name == name)
}

/// Parses the leading integer of `s` the way C `atoi` does.
///
/// Leading whitespace and an optional sign are accepted, parsing stops at
/// the first non-digit and an input with no digits gives 0.
pub fn atoi(
    s: &str,
) -> i32 {
    let trimmed = s.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        value = (value * 10 + (b - b'0') as i64).min(i32::MAX as i64 + 1);
    }
    let value = if negative { -value } else { value };
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
