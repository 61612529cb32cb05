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
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::DecodeError;
use bincode::error::EncodeError;
use bincode::Decode;
use bincode::Encode;

use crate::codec::AsciiString;
use crate::codec::WideString;
use crate::parameter::ParameterNameValue;

pub const DEFAULT_LOCALE: &str = "en-US";

/// File header of a container file.
///
/// Records the file type, a unique file id, the creation time, the header
/// parameters and the parent headers of the files this file was derived
/// from. Parents are written depth first and their parameters are kept
/// separate from the parameters of this header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericDataHeader {
    pub file_type_id: String,
    pub file_id: String,
    pub creation_time: String,
    pub locale: String,
    pub params: Vec<ParameterNameValue>,
    pub parents: Vec<GenericDataHeader>,
}

impl GenericDataHeader {
    /// Creates a header stamped with a fresh file id and the current time.
    pub fn new(file_type_id: &str) -> Self {
        GenericDataHeader {
            file_type_id: file_type_id.to_string(),
            file_id: uuid::Uuid::new_v4().to_string(),
            creation_time: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            params: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Adds `param`, replacing any existing parameter with the same name.
    pub fn add_param(
        &mut self,
        param: ParameterNameValue,
    ) {
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == param.name) {
            *existing = param;
        } else {
            self.params.push(param);
        }
    }

    pub fn find_param(&self, name: &str) -> Option<&ParameterNameValue> {
        crate::parameter::find_param(&self.params, name)
    }

    pub fn add_parent(
        &mut self,
        parent: GenericDataHeader,
    ) {
        self.parents.push(parent);
    }

    /// Finds the first header of type `file_type_id` among the parents,
    /// searching depth first.
    pub fn find_parent(
        &self,
        file_type_id: &str,
    ) -> Option<&GenericDataHeader> {
        for parent in self.parents.iter() {
            if parent.file_type_id == file_type_id {
                return Some(parent)
            }
            if let Some(found) = parent.find_parent(file_type_id) {
                return Some(found)
            }
        }
        None
    }
}

impl Encode for GenericDataHeader {
    fn encode<En: Encoder>(
        &self,
        encoder: &mut En,
    ) -> Result<(), EncodeError> {
        AsciiString::from(self.file_type_id.as_str()).encode(encoder)?;
        AsciiString::from(self.file_id.as_str()).encode(encoder)?;
        WideString(self.creation_time.clone()).encode(encoder)?;
        WideString(self.locale.clone()).encode(encoder)?;
        (self.params.len() as i32).encode(encoder)?;
        for param in self.params.iter() {
            param.encode(encoder)?;
        }
        (self.parents.len() as i32).encode(encoder)?;
        for parent in self.parents.iter() {
            parent.encode(encoder)?;
        }
        Ok(())
    }
}

fn decode_count<D: Decoder>(
    decoder: &mut D,
    what: &str,
) -> Result<usize, DecodeError> {
    let n = i32::decode(decoder)?;
    if n < 0 {
        return Err(DecodeError::OtherString(format!("negative {} count {}", what, n)))
    }
    Ok(n as usize)
}

/// Deepest chain of parent headers accepted when decoding.
pub const MAX_PARENT_DEPTH: usize = 64;

fn decode_header<D: Decoder>(
    decoder: &mut D,
    depth: usize,
) -> Result<GenericDataHeader, DecodeError> {
    if depth > MAX_PARENT_DEPTH {
        return Err(DecodeError::OtherString(format!("parent headers nested deeper than {}", MAX_PARENT_DEPTH)))
    }
    let file_type_id = AsciiString::decode(decoder)?;
    let file_id = AsciiString::decode(decoder)?;
    let creation_time = WideString::decode(decoder)?;
    let locale = WideString::decode(decoder)?;

    let n_params = decode_count(decoder, "parameter")?;
    let mut params: Vec<ParameterNameValue> = Vec::new();
    for _ in 0..n_params {
        params.push(ParameterNameValue::decode(decoder)?);
    }

    let n_parents = decode_count(decoder, "parent header")?;
    let mut parents: Vec<GenericDataHeader> = Vec::new();
    for _ in 0..n_parents {
        parents.push(decode_header(decoder, depth + 1)?);
    }

    Ok(GenericDataHeader {
        file_type_id: file_type_id.0.to_string(),
        file_id: file_id.0.to_string(),
        creation_time: creation_time.0,
        locale: locale.0,
        params, parents,
    })
}

impl<Context> Decode<Context> for GenericDataHeader {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        decode_header(decoder, 0)
    }
}
bincode::impl_borrow_decode!(GenericDataHeader);
