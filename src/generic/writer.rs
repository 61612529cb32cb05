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
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::DecodeError;
use bincode::error::EncodeError;
use bincode::encode_into_std_write;
use bincode::{Encode, Decode};

use crate::codec::container_config;
use crate::codec::WideString;
use crate::generic::dataset::ColumnDescriptor;
use crate::generic::DataSet;
use crate::generic::FilePreamble;
use crate::generic::FormatError;
use crate::generic::GenericData;
use crate::generic::GenericDataHeader;
use crate::generic::CONTAINER_MAGIC;
use crate::generic::CONTAINER_VERSION;
use crate::generic::PREAMBLE_LEN;
use crate::parameter::ParameterNameValue;

type E = Box<dyn std::error::Error>;

/// Directory entry of a data group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct DataGroupEntry {
    pub next_group_pos: u32,
    pub first_set_pos: u32,
    pub n_sets: i32,
    pub name: WideString,
}

/// Header of a data set, everything up to the first row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSetEntry {
    pub first_row_pos: u32,
    pub next_set_pos: u32,
    pub name: String,
    pub params: Vec<ParameterNameValue>,
    pub columns: Vec<ColumnDescriptor>,
    pub n_rows: u32,
}

impl Encode for DataSetEntry {
    fn encode<En: Encoder>(
        &self,
        encoder: &mut En,
    ) -> Result<(), EncodeError> {
        self.first_row_pos.encode(encoder)?;
        self.next_set_pos.encode(encoder)?;
        WideString(self.name.clone()).encode(encoder)?;
        (self.params.len() as i32).encode(encoder)?;
        for param in self.params.iter() {
            param.encode(encoder)?;
        }
        (self.columns.len() as u32).encode(encoder)?;
        for column in self.columns.iter() {
            column.encode(encoder)?;
        }
        self.n_rows.encode(encoder)
    }
}

impl<Context> Decode<Context> for DataSetEntry {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let first_row_pos = u32::decode(decoder)?;
        let next_set_pos = u32::decode(decoder)?;
        let name = WideString::decode(decoder)?;
        let n_params = i32::decode(decoder)?;
        if n_params < 0 {
            return Err(DecodeError::OtherString(format!("negative parameter count {} in data set {}", n_params, name.0)))
        }
        let mut params: Vec<ParameterNameValue> = Vec::new();
        for _ in 0..n_params {
            params.push(ParameterNameValue::decode(decoder)?);
        }
        let n_cols = u32::decode(decoder)?;
        let mut columns: Vec<ColumnDescriptor> = Vec::new();
        for _ in 0..n_cols {
            columns.push(ColumnDescriptor::decode(decoder)?);
        }
        let n_rows = u32::decode(decoder)?;
        Ok(DataSetEntry { first_row_pos, next_set_pos, name: name.0, params, columns, n_rows })
    }
}
bincode::impl_borrow_decode!(DataSetEntry);

fn encode_to_vec<T: Encode>(
    value: &T,
) -> Result<Vec<u8>, E> {
    let mut bytes: Vec<u8> = Vec::new();
    encode_into_std_write(value, &mut bytes, container_config())?;
    Ok(bytes)
}

fn to_pos(
    pos: usize,
) -> Result<u32, E> {
    u32::try_from(pos).map_err(|_| Box::new(FormatError{ what: format!("offset {} does not fit in 32 bits", pos) }) as E)
}

/// Encodes the preamble and `header` for a file with `n_groups` groups.
///
/// The length of the returned bytes is the position of the first data
/// group.
pub fn encode_file_header(
    header: &GenericDataHeader,
    n_groups: usize,
) -> Result<Vec<u8>, E> {
    let header_bytes = encode_to_vec(header)?;
    let preamble = FilePreamble {
        magic: CONTAINER_MAGIC,
        version: CONTAINER_VERSION,
        n_groups: i32::try_from(n_groups).map_err(|_| FormatError{ what: format!("too many data groups: {}", n_groups) })?,
        first_group_pos: to_pos(PREAMBLE_LEN + header_bytes.len())?,
    };
    let mut bytes = encode_to_vec(&preamble)?;
    if bytes.len() != PREAMBLE_LEN {
        return Err(Box::new(FormatError{ what: format!("preamble is {} bytes, expected {}", bytes.len(), PREAMBLE_LEN) }))
    }
    bytes.extend(header_bytes);
    Ok(bytes)
}

/// Encodes `data_set` assuming it starts at byte offset `pos`.
///
/// Measures the rows first so the ascii column widths and the row and next
/// data set positions are known before anything is encoded.
pub fn encode_data_set(
    data_set: &DataSet,
    pos: usize,
) -> Result<Vec<u8>, E> {
    let rows = data_set.encode_rows()?;
    let mut entry = DataSetEntry {
        first_row_pos: 0,
        next_set_pos: 0,
        name: data_set.name.clone(),
        params: data_set.params.clone(),
        columns: data_set.descriptors(),
        n_rows: data_set.n_rows() as u32,
    };
    let entry_len = encode_to_vec(&entry)?.len();
    entry.first_row_pos = to_pos(pos + entry_len)?;
    entry.next_set_pos = to_pos(pos + entry_len + rows.len())?;

    let mut bytes = encode_to_vec(&entry)?;
    bytes.extend(rows);
    Ok(bytes)
}

/// Encodes a whole container file into memory.
pub fn encode_generic(
    data: &GenericData,
) -> Result<Vec<u8>, E> {
    let mut bytes = encode_file_header(&data.header, data.groups.len())?;

    for group in data.groups.iter() {
        let group_pos = bytes.len();
        let mut entry = DataGroupEntry {
            next_group_pos: 0,
            first_set_pos: 0,
            n_sets: group.data_sets.len() as i32,
            name: WideString(group.name.clone()),
        };
        let entry_len = encode_to_vec(&entry)?.len();

        let mut sets: Vec<u8> = Vec::new();
        for data_set in group.data_sets.iter() {
            let set_bytes = encode_data_set(data_set, group_pos + entry_len + sets.len())?;
            sets.extend(set_bytes);
        }

        entry.first_set_pos = to_pos(group_pos + entry_len)?;
        entry.next_group_pos = to_pos(group_pos + entry_len + sets.len())?;
        bytes.extend(encode_to_vec(&entry)?);
        bytes.extend(sets);
    }

    Ok(bytes)
}

/// Writes a container file to `conn`, returning the number of bytes written.
pub fn write_generic<W: Write>(
    data: &GenericData,
    conn: &mut W,
) -> Result<usize, E> {
    let bytes = encode_generic(data)?;
    conn.write_all(&bytes)?;
    conn.flush()?;
    Ok(bytes.len())
}

/// Writes a container file to `path`.
pub fn write_generic_file(
    data: &GenericData,
    path: &Path,
) -> Result<usize, E> {
    let f = File::create(path)?;
    let mut conn = BufWriter::new(f);
    let nbytes = write_generic(data, &mut conn)?;
    log::debug!("Wrote {} bytes to {}", nbytes, path.display());
    Ok(nbytes)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn preamble_points_past_header() {
        use super::encode_file_header;
        use crate::generic::GenericDataHeader;

        let header = GenericDataHeader::new("affymetrix-calvin-intensity");
        let bytes = encode_file_header(&header, 1).unwrap();

        assert_eq!(bytes[0], 59);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[2..6], [0, 0, 0, 1]);
        assert_eq!(u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize, bytes.len());
    }

    #[test]
    fn too_many_groups() {
        use super::encode_file_header;
        use crate::generic::GenericDataHeader;

        let header = GenericDataHeader::new("affymetrix-calvin-intensity");

        assert!(encode_file_header(&header, i32::MAX as usize + 1).is_err());
    }

    #[test]
    fn data_set_positions_match_payload() {
        use super::encode_data_set;
        use crate::generic::{ColumnData, DataSet};

        let mut set = DataSet::new("Intensity");
        set.add_column("Intensity", ColumnData::Float(vec![1.0, 2.0, 3.0]));

        let start = 100;
        let bytes = encode_data_set(&set, start).unwrap();
        let first_row_pos = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let next_set_pos = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

        assert_eq!(next_set_pos, start + bytes.len());
        assert_eq!(next_set_pos - first_row_pos, 12);
    }
}
