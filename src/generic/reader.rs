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
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use bincode::decode_from_std_read;
use bincode::Decode;

use crate::codec::container_config;
use crate::codec::AsciiString;
use crate::codec::read_file_bytes;
use crate::generic::writer::DataGroupEntry;
use crate::generic::writer::DataSetEntry;
use crate::generic::DataGroup;
use crate::generic::DataSet;
use crate::generic::FilePreamble;
use crate::generic::FormatError;
use crate::generic::GenericData;
use crate::generic::GenericDataHeader;
use crate::generic::CONTAINER_MAGIC;
use crate::generic::CONTAINER_VERSION;

type E = Box<dyn std::error::Error>;

fn decode_next<T: Decode<()>, R: Read>(
    conn: &mut R,
) -> Result<T, E> {
    Ok(decode_from_std_read(conn, container_config())?)
}

fn format_error(what: String) -> E {
    Box::new(FormatError{ what })
}

/// Reads and checks the file preamble.
pub fn read_preamble<R: Read>(
    conn: &mut R,
) -> Result<FilePreamble, E> {
    let preamble: FilePreamble = decode_next(conn)?;
    if preamble.magic != CONTAINER_MAGIC {
        return Err(format_error(format!("bad magic number {}", preamble.magic)))
    }
    if preamble.version != CONTAINER_VERSION {
        return Err(format_error(format!("unsupported version {}", preamble.version)))
    }
    if preamble.n_groups < 0 {
        return Err(format_error(format!("negative data group count {}", preamble.n_groups)))
    }
    Ok(preamble)
}

/// Reads the preamble and file header without touching the data groups.
pub fn read_generic_header<R: Read>(
    conn: &mut R,
) -> Result<(FilePreamble, GenericDataHeader), E> {
    let preamble = read_preamble(conn)?;
    let header: GenericDataHeader = decode_next(conn)?;
    Ok((preamble, header))
}

fn read_data_set<R: Read + Seek>(
    conn: &mut R,
    file_len: u64,
) -> Result<(DataSet, u64), E> {
    let entry: DataSetEntry = decode_next(conn)?;
    let pos = conn.stream_position()?;
    if pos != entry.first_row_pos as u64 {
        return Err(format_error(format!("data set {} rows start at {} but the directory says {}", entry.name, pos, entry.first_row_pos)))
    }
    if entry.next_set_pos as u64 > file_len || (entry.next_set_pos as u64) < pos {
        return Err(format_error(format!("data set {} ends at {} outside of the file", entry.name, entry.next_set_pos)))
    }

    let mut rows: Vec<u8> = vec![0_u8; (entry.next_set_pos as u64 - pos) as usize];
    conn.read_exact(&mut rows)?;

    let mut data_set = DataSet::new(&entry.name);
    data_set.params = entry.params;
    data_set.decode_rows(&entry.columns, entry.n_rows as usize, &rows)?;
    Ok((data_set, entry.next_set_pos as u64))
}

/// Reads a whole container file.
///
/// The data group and data set positions recorded in the file must match
/// the positions where the contents were actually found.
pub fn read_generic<R: Read + Seek>(
    conn: &mut R,
) -> Result<GenericData, E> {
    let file_len = conn.seek(SeekFrom::End(0))?;
    conn.seek(SeekFrom::Start(0))?;

    let (preamble, header) = read_generic_header(conn)?;
    let mut data = GenericData::new(header);

    let mut group_pos = preamble.first_group_pos as u64;
    for _ in 0..preamble.n_groups {
        if group_pos >= file_len {
            return Err(format_error(format!("data group at {} is past the end of the file", group_pos)))
        }
        conn.seek(SeekFrom::Start(group_pos))?;
        let entry: DataGroupEntry = decode_next(conn)?;
        if entry.n_sets < 0 {
            return Err(format_error(format!("negative data set count {} in group {}", entry.n_sets, entry.name.0)))
        }

        let mut group = DataGroup::new(&entry.name.0);
        let mut set_pos = entry.first_set_pos as u64;
        for _ in 0..entry.n_sets {
            conn.seek(SeekFrom::Start(set_pos))?;
            let (data_set, next) = read_data_set(conn, file_len)?;
            group.data_sets.push(data_set);
            set_pos = next;
        }
        data.groups.push(group);
        group_pos = entry.next_group_pos as u64;
    }

    Ok(data)
}

/// Reads the container file at `path`.
pub fn read_generic_file(
    path: &Path,
) -> Result<GenericData, E> {
    let bytes = read_file_bytes(path)?;
    read_generic(&mut Cursor::new(bytes))
}

/// Reads only the file header of the container file at `path`.
pub fn read_generic_file_header(
    path: &Path,
) -> Result<GenericDataHeader, E> {
    let bytes = read_file_bytes(path)?;
    let (_, header) = read_generic_header(&mut Cursor::new(bytes))?;
    Ok(header)
}

/// File type id of the container file starting with `bytes`.
///
/// Reads only the preamble and the type id, so `bytes` can be the first
/// few hundred bytes of the file.
pub fn container_file_type(
    bytes: &[u8],
) -> Option<String> {
    let mut conn = Cursor::new(bytes);
    read_preamble(&mut conn).ok()?;
    let file_type_id: AsciiString = decode_next(&mut conn).ok()?;
    Some(file_type_id.0.to_string())
}

/// Checks whether `bytes` starts with a readable container file header.
pub fn is_generic(
    bytes: &[u8],
) -> bool {
    read_generic_header(&mut Cursor::new(bytes)).is_ok()
}

// Tests
#[cfg(test)]
mod tests {

    fn mock_data() -> crate::generic::GenericData {
        use crate::generic::{ColumnData, DataGroup, DataSet, GenericData, GenericDataHeader};
        use crate::parameter::ParameterNameValue;
        use bstr::BString;

        let mut header = GenericDataHeader::new("affymetrix-calvin-intensity");
        header.add_param(ParameterNameValue::int32("affymetrix-cel-rows", 2));

        let mut intensity = DataSet::new("Intensity");
        intensity.add_column("Intensity", ColumnData::Float(vec![1.0, 2.5, 3.0, 4.0]));
        let mut outlier = DataSet::new("Outlier");
        outlier.add_param(ParameterNameValue::uint32("count", 1));
        outlier.add_column("X", ColumnData::Int16(vec![1]));
        outlier.add_column("Y", ColumnData::Int16(vec![0]));
        let mut names = DataSet::new("Names");
        names.add_column("Name", ColumnData::Ascii(vec![BString::from("AFFX-1"), BString::from("x")]));

        let mut group = DataGroup::new("Default Group");
        group.data_sets = vec![intensity, outlier];
        let mut second = DataGroup::new("Second");
        second.data_sets = vec![names];

        let mut data = GenericData::new(header);
        data.groups = vec![group, second];
        data
    }

    #[test]
    fn write_then_read() {
        use super::read_generic;
        use crate::generic::writer::write_generic;
        use std::io::Cursor;

        let data = mock_data();
        let mut bytes: Vec<u8> = Vec::new();
        write_generic(&data, &mut bytes).unwrap();

        let got = read_generic(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn read_header_only() {
        use super::{is_generic, read_generic_header};
        use crate::generic::writer::encode_generic;
        use std::io::Cursor;

        let data = mock_data();
        let bytes = encode_generic(&data).unwrap();

        let (preamble, header) = read_generic_header(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(preamble.n_groups, 2);
        assert_eq!(header, data.header);
        assert!(is_generic(&bytes));
        assert!(!is_generic(b"[CEL]\nVersion=3\n"));
    }

    #[test]
    fn file_type_from_truncated_header() {
        use super::container_file_type;
        use crate::generic::writer::encode_generic;

        let bytes = encode_generic(&mock_data()).unwrap();

        assert_eq!(container_file_type(&bytes[0..50]).as_deref(), Some("affymetrix-calvin-intensity"));
        assert_eq!(container_file_type(&bytes[0..20]), None);
        assert_eq!(container_file_type(b"[CEL]\nVersion=3\n"), None);
    }

    #[test]
    fn mismatched_row_offset_is_fatal() {
        use super::read_generic;
        use crate::generic::writer::encode_generic;
        use std::io::Cursor;

        let data = mock_data();
        let mut bytes = encode_generic(&data).unwrap();

        // first_row_pos of the first data set follows the group entry
        let first_group_pos = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let first_set_pos = u32::from_be_bytes([bytes[first_group_pos + 4], bytes[first_group_pos + 5], bytes[first_group_pos + 6], bytes[first_group_pos + 7]]) as usize;
        bytes[first_set_pos + 3] = bytes[first_set_pos + 3].wrapping_add(1);

        let got = read_generic(&mut Cursor::new(bytes));
        assert!(got.is_err());
        assert!(got.unwrap_err().to_string().contains("rows start at"));
    }

    #[test]
    fn bad_magic_is_rejected() {
        use super::read_generic;
        use std::io::Cursor;

        let bytes: Vec<u8> = vec![64, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
        assert!(read_generic(&mut Cursor::new(bytes)).is_err());
    }
}
