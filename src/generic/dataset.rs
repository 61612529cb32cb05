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
use bincode::{Encode, Decode};

use bstr::BString;
use bstr::ByteSlice;

use crate::codec::WideString;
use crate::generic::FormatError;
use crate::parameter::ParameterNameValue;

type E = Box<dyn std::error::Error>;

/// Type tag of a data set column.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColumnType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    #[default]
    Float,
    Ascii,
}

impl ColumnType {
    pub fn from_u8(tag: u8) -> Option<ColumnType> {
        match tag {
            0 => Some(ColumnType::Int8),
            1 => Some(ColumnType::UInt8),
            2 => Some(ColumnType::Int16),
            3 => Some(ColumnType::UInt16),
            4 => Some(ColumnType::Int32),
            5 => Some(ColumnType::UInt32),
            6 => Some(ColumnType::Float),
            7 => Some(ColumnType::Ascii),
            _ => None,
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            ColumnType::Int8 => 0,
            ColumnType::UInt8 => 1,
            ColumnType::Int16 => 2,
            ColumnType::UInt16 => 3,
            ColumnType::Int32 => 4,
            ColumnType::UInt32 => 5,
            ColumnType::Float => 6,
            ColumnType::Ascii => 7,
        }
    }

    /// Width of a numeric cell in bytes, None for ascii columns.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Int8 | ColumnType::UInt8 => Some(1),
            ColumnType::Int16 | ColumnType::UInt16 => Some(2),
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Float => Some(4),
            ColumnType::Ascii => None,
        }
    }
}

/// Column descriptor as stored in the data set header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ColumnDescriptor {
    pub name: WideString,
    pub col_type: u8,
    pub size: i32,
}

/// Values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
    Ascii(Vec<BString>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Int8(_) => ColumnType::Int8,
            ColumnData::UInt8(_) => ColumnType::UInt8,
            ColumnData::Int16(_) => ColumnType::Int16,
            ColumnData::UInt16(_) => ColumnType::UInt16,
            ColumnData::Int32(_) => ColumnType::Int32,
            ColumnData::UInt32(_) => ColumnType::UInt32,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Ascii(_) => ColumnType::Ascii,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int8(v) => v.len(),
            ColumnData::UInt8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::UInt16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Ascii(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_capacity(
        col_type: ColumnType,
        n: usize,
    ) -> Self {
        match col_type {
            ColumnType::Int8 => ColumnData::Int8(Vec::with_capacity(n)),
            ColumnType::UInt8 => ColumnData::UInt8(Vec::with_capacity(n)),
            ColumnType::Int16 => ColumnData::Int16(Vec::with_capacity(n)),
            ColumnType::UInt16 => ColumnData::UInt16(Vec::with_capacity(n)),
            ColumnType::Int32 => ColumnData::Int32(Vec::with_capacity(n)),
            ColumnType::UInt32 => ColumnData::UInt32(Vec::with_capacity(n)),
            ColumnType::Float => ColumnData::Float(Vec::with_capacity(n)),
            ColumnType::Ascii => ColumnData::Ascii(Vec::with_capacity(n)),
        }
    }

    /// Width of one cell in bytes.
    ///
    /// Ascii columns are as wide as the longest value plus a terminating
    /// NUL.
    pub fn width(&self) -> usize {
        match self {
            ColumnData::Ascii(v) => v.iter().map(|s| s.len()).max().unwrap_or(0) + 1,
            _ => self.column_type().fixed_width().unwrap_or(0),
        }
    }

    fn encode_cell(
        &self,
        row: usize,
        width: usize,
        out: &mut Vec<u8>,
    ) {
        match self {
            ColumnData::Int8(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::UInt8(v) => out.push(v[row]),
            ColumnData::Int16(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::UInt16(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::Int32(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::UInt32(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::Float(v) => out.extend_from_slice(&v[row].to_be_bytes()),
            ColumnData::Ascii(v) => {
                let value = &v[row];
                let n = value.len().min(width);
                out.extend_from_slice(&value[0..n]);
                out.resize(out.len() + width - n, 0);
            },
        }
    }

    fn decode_cell(
        &mut self,
        cell: &[u8],
    ) {
        match self {
            ColumnData::Int8(v) => v.push(cell[0] as i8),
            ColumnData::UInt8(v) => v.push(cell[0]),
            ColumnData::Int16(v) => v.push(i16::from_be_bytes([cell[0], cell[1]])),
            ColumnData::UInt16(v) => v.push(u16::from_be_bytes([cell[0], cell[1]])),
            ColumnData::Int32(v) => v.push(i32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]])),
            ColumnData::UInt32(v) => v.push(u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]])),
            ColumnData::Float(v) => v.push(f32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]])),
            ColumnData::Ascii(v) => {
                let end = cell.find_byte(0).unwrap_or(cell.len());
                v.push(BString::from(&cell[0..end]));
            },
        }
    }
}

/// Named column of a [DataSet].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Fixed-schema table of typed columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    pub name: String,
    pub params: Vec<ParameterNameValue>,
    pub columns: Vec<Column>,
}

impl DataSet {
    pub fn new(name: &str) -> Self {
        DataSet { name: name.to_string(), params: Vec::new(), columns: Vec::new() }
    }

    pub fn add_column(
        &mut self,
        name: &str,
        data: ColumnData,
    ) {
        self.columns.push(Column { name: name.to_string(), data });
    }

    pub fn add_param(
        &mut self,
        param: ParameterNameValue,
    ) {
        self.params.push(param);
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    /// Returns column `idx`.
    pub fn column_at(&self, idx: usize) -> Option<&ColumnData> {
        self.columns.get(idx).map(|c| &c.data)
    }

    /// Number of rows, taken from the first column.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    /// Column descriptors with the ascii widths measured from the data.
    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.columns.iter().map(|c| ColumnDescriptor {
            name: WideString(c.name.clone()),
            col_type: c.data.column_type().to_u8(),
            size: c.data.width() as i32,
        }).collect()
    }

    /// Encodes all rows row-major.
    ///
    /// Returns an error if the columns have different lengths.
    pub fn encode_rows(&self) -> Result<Vec<u8>, E> {
        let n_rows = self.n_rows();
        if let Some(bad) = self.columns.iter().find(|c| c.data.len() != n_rows) {
            return Err(Box::new(FormatError{ what: format!("column {} in data set {} has {} rows, expected {}", bad.name, self.name, bad.data.len(), n_rows) }))
        }
        let widths: Vec<usize> = self.columns.iter().map(|c| c.data.width()).collect();
        let row_width: usize = widths.iter().sum();
        let mut out: Vec<u8> = Vec::with_capacity(row_width * n_rows);
        for row in 0..n_rows {
            self.columns.iter().zip(widths.iter()).for_each(|(c, width)| {
                c.data.encode_cell(row, *width, &mut out);
            });
        }
        Ok(out)
    }

    /// Decodes `n_rows` rows from `bytes` into columns described by `descriptors`.
    pub fn decode_rows(
        &mut self,
        descriptors: &[ColumnDescriptor],
        n_rows: usize,
        bytes: &[u8],
    ) -> Result<(), E> {
        let mut widths: Vec<usize> = Vec::with_capacity(descriptors.len());
        let mut types: Vec<ColumnType> = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let col_type = ColumnType::from_u8(desc.col_type)
                .ok_or_else(|| FormatError{ what: format!("unknown column type {} in data set {}", desc.col_type, self.name) })?;
            let width = match col_type.fixed_width() {
                Some(w) => w,
                None if desc.size > 0 => desc.size as usize,
                None => return Err(Box::new(FormatError{ what: format!("invalid width {} for column {}", desc.size, desc.name.0) })),
            };
            widths.push(width);
            types.push(col_type);
        }

        // Row count comes from the file and is checked before allocating.
        let row_width: usize = widths.iter().sum();
        let expected = row_width.checked_mul(n_rows)
            .ok_or_else(|| FormatError{ what: format!("data set {} has too many rows: {}", self.name, n_rows) })?;
        if bytes.len() != expected {
            return Err(Box::new(FormatError{ what: format!("data set {} has {} bytes of rows, expected {}", self.name, bytes.len(), expected) }))
        }

        let mut columns: Vec<Column> = descriptors.iter().zip(types).map(|(desc, col_type)| {
            Column { name: desc.name.0.clone(), data: ColumnData::with_capacity(col_type, n_rows) }
        }).collect();

        if row_width > 0 {
            for row in bytes.chunks_exact(row_width) {
                let mut pos = 0;
                columns.iter_mut().zip(widths.iter()).for_each(|(c, width)| {
                    c.data.decode_cell(&row[pos..(pos + width)]);
                    pos += width;
                });
            }
        }
        self.columns = columns;
        Ok(())
    }
}

/// Named list of [DataSet]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataGroup {
    pub name: String,
    pub data_sets: Vec<DataSet>,
}

impl DataGroup {
    pub fn new(name: &str) -> Self {
        DataGroup { name: name.to_string(), data_sets: Vec::new() }
    }

    pub fn data_set(&self, name: &str) -> Option<&DataSet> {
        self.data_sets.iter().find(|d| d.name == name)
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn ascii_width_is_longest_plus_one() {
        use super::ColumnData;
        use bstr::BString;

        let data = ColumnData::Ascii(vec![BString::from("AFFX-a"), BString::from("probe_set_1"), BString::from("")]);

        assert_eq!(data.width(), 12);
    }

    #[test]
    fn encode_rows_row_major() {
        use super::{ColumnData, DataSet};
        use bstr::BString;

        let mut set = DataSet::new("Outlier");
        set.add_column("X", ColumnData::Int16(vec![1, 2]));
        set.add_column("Name", ColumnData::Ascii(vec![BString::from("ab"), BString::from("c")]));

        let got = set.encode_rows().unwrap();
        let expected: Vec<u8> = vec![0, 1, b'a', b'b', 0, 0, 2, b'c', 0, 0];

        assert_eq!(got, expected);
    }

    #[test]
    fn encode_rows_uneven_columns() {
        use super::{ColumnData, DataSet};

        let mut set = DataSet::new("Outlier");
        set.add_column("X", ColumnData::Int16(vec![1, 2]));
        set.add_column("Y", ColumnData::Int16(vec![1]));

        assert!(set.encode_rows().is_err());
    }

    #[test]
    fn decode_rows() {
        use super::{ColumnData, DataSet};

        let mut set = DataSet::new("Intensity");
        set.add_column("Intensity", ColumnData::Float(vec![1.5, 100.25]));
        set.add_column("Pixel", ColumnData::UInt32(vec![9, 16]));
        set.add_column("Call", ColumnData::Int8(vec![-1, 3]));

        let bytes = set.encode_rows().unwrap();
        let descriptors = set.descriptors();

        let mut got = DataSet::new("Intensity");
        got.decode_rows(&descriptors, 2, &bytes).unwrap();

        assert_eq!(got, set);
    }

    #[test]
    fn decode_rows_wrong_length() {
        use super::{ColumnData, DataSet};

        let mut set = DataSet::new("Intensity");
        set.add_column("Intensity", ColumnData::Float(vec![1.5, 100.25]));
        let descriptors = set.descriptors();

        let mut got = DataSet::new("Intensity");
        assert!(got.decode_rows(&descriptors, 3, &[0_u8; 8]).is_err());
    }

    #[test]
    fn decode_rows_huge_row_count() {
        use super::{ColumnDescriptor, DataSet};
        use crate::codec::WideString;

        let descriptors = vec![ColumnDescriptor { name: WideString("Name".to_string()), col_type: 7, size: 4 }];

        let mut got = DataSet::new("Entry");
        assert!(got.decode_rows(&descriptors, u32::MAX as usize, &[0_u8; 8]).is_err());
        assert!(got.decode_rows(&descriptors, usize::MAX, &[0_u8; 8]).is_err());
        assert!(got.columns.is_empty());
    }
}
