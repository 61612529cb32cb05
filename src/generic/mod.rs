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

//! Generic self-describing container format.
//!
//! A container file consists of a [FilePreamble], a [GenericDataHeader]
//! with its recursive parent headers, and a list of [DataGroup]s that each
//! hold one or more typed [DataSet] tables.
//!
//! All integers are big endian ([container_config](crate::codec::container_config)).
//!
//! ## Layout
//!
//! ```text
//! preamble:    u8 magic=59, u8 version=1, i32 n_groups, u32 first_group_pos
//! header:      ascii type_id, ascii file_id, wide creation_time, wide locale,
//!              i32 n_params, param*, i32 n_parents, header*
//! group:       u32 next_group_pos, u32 first_set_pos, i32 n_sets, wide name
//! data set:    u32 first_row_pos, u32 next_set_pos, wide name,
//!              i32 n_params, param*, u32 n_cols, column*, u32 n_rows, rows
//! ```
//!
//! The group and data set positions are absolute byte offsets and must
//! match the bytes actually written. [writer::write_generic] computes them
//! from the encoded payload before writing anything, and
//! [reader::read_generic] verifies them while reading.
//!

pub mod dataset;
pub mod header;
pub mod reader;
pub mod writer;

use bincode::{Encode, Decode};

pub use dataset::{Column, ColumnData, ColumnType, DataGroup, DataSet};
pub use header::GenericDataHeader;

pub const CONTAINER_MAGIC: u8 = 59;
pub const CONTAINER_VERSION: u8 = 1;

/// Size of an encoded [FilePreamble] in bytes.
pub const PREAMBLE_LEN: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct FilePreamble {
    pub magic: u8,
    pub version: u8,
    pub n_groups: i32,
    pub first_group_pos: u32,
}

/// Structural error in a container file.
#[derive(Debug, Clone)]
pub struct FormatError {
    pub what: String,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid container file: {}", self.what)
    }
}

impl std::error::Error for FormatError {}

/// Contents of a container file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericData {
    pub header: GenericDataHeader,
    pub groups: Vec<DataGroup>,
}

impl GenericData {
    pub fn new(header: GenericDataHeader) -> Self {
        GenericData { header, groups: Vec::new() }
    }

    pub fn group(&self, name: &str) -> Option<&DataGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Looks up a data set by group and data set name.
    pub fn data_set(
        &self,
        group: &str,
        name: &str,
    ) -> Option<&DataSet> {
        self.group(group).and_then(|g| g.data_set(name))
    }
}
