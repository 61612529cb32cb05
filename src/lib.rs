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

//! celchp is a library and a command-line client for:
//!
//!   - Converting microarray cell intensity (CEL) files between the legacy
//!     text, legacy binary (XDA) and container versions.
//!   - Converting probe set analysis result (CHP) files between the legacy
//!     GCOS binary, legacy MAS5 text and container versions.
//!   - Comparing two CEL or two CHP files of any version.
//!
//! Conversions preserve the cell data, outlier and mask sets, the DAT
//! header and the algorithm parameters. Converting into the container
//! version also records where the data came from in a parent header.
//!
//! ## Usage
//!
//! ### Command line
//!
//! The celchp CLI supports the following subcommands:
//!   - `celchp cel-convert` convert a CEL file to another version.
//!   - `celchp chp-convert` convert a CHP file to another version.
//!   - `celchp cel-compare` report differences between two CEL files.
//!   - `celchp chp-compare` report differences between two CHP files.
//!   - `celchp info` print the version and container header of a file.
//!
//! Files are converted in place unless an output path is given. An
//! in-place conversion renames the input to `<file>.bak` first and
//! restores it if the conversion fails.
//!
//! Converting CHP files into the container version needs the probe set
//! names of the array from a `<chip_type>.PSI` or `<chip_type>.CDF` file
//! in the directory given with `--library`.
//!
//! ### Rust API
//!
//! The conversion engines are [CelFileConverter](converter::CelFileConverter)
//! and [ChpFileConverter](converter::ChpFileConverter). Both take a
//! [ConverterConfig](converter::config::ConverterConfig) with the settings
//! shared by every conversion and return a
//! [ConversionError](converter::ConversionError) on failure.
//!
//! ```rust
//! use celchp::cel::{read_legacy_cel, write_legacy_cel, CelFile, LegacyCelFormat};
//! use celchp::converter::{CelFileConverter, CelFileVersion};
//! use celchp::converter::config::ConverterConfig;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("sample.CEL");
//! let mut cel = CelFile::new(2, 3);
//! cel.intensities = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! cel.set_outlier(1, 0, true);
//! write_legacy_cel(&cel, &path, LegacyCelFormat::Text).unwrap();
//!
//! let mut converter = CelFileConverter::new(ConverterConfig::default());
//! converter.convert_file(&path, CelFileVersion::Calvin, None).unwrap();
//! assert_eq!(CelFileVersion::of_file(&path), CelFileVersion::Calvin);
//!
//! converter.convert_file(&path, CelFileVersion::Xda, None).unwrap();
//! let (got, _) = read_legacy_cel(&path).unwrap();
//! assert_eq!(got.intensities, cel.intensities);
//! assert_eq!(got.outlier_coords(), vec![(1, 0)]);
//! ```
//!
//! The file formats are read and written by the modules:
//!
//!   - [generic]: the container file shared by the container CEL and CHP versions.
//!   - [parameter]: typed name/value parameters stored in container headers.
//!   - [cel]: the CEL model, its legacy layouts and its container view.
//!   - [chp]: the CHP model, its legacy layouts and its container view.
//!
//! ## File format specification
//!
//! The container file starts with a preamble followed by the file header
//! and the data groups. All numbers are big endian.
//!
//! ```text
//! preamble:    u8 magic=59, u8 version=1, i32 n_groups, u32 first_group_pos
//! header:      type_id, file_id, creation_time, locale,
//!              i32 n_params, param*, i32 n_parents, header*
//! group:       u32 next_group_pos, u32 first_set_pos, i32 n_sets, name
//! data set:    u32 first_row_pos, u32 next_set_pos, name,
//!              i32 n_params, param*, u32 n_cols, column*, u32 n_rows, rows
//! ```
//!
//! The legacy layouts are described in [cel] and [chp].
//!

use std::path::Path;

use generic::reader::read_generic_file_header;
use generic::GenericDataHeader;

pub mod codec;
pub mod parameter;
pub mod generic;
pub mod cel;
pub mod chp;
pub mod converter;
pub mod compare;

type E = Box<dyn std::error::Error>;

fn describe_header(
    header: &GenericDataHeader,
    depth: usize,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{}FileTypeId={}\n", indent, header.file_type_id));
    if !header.file_id.is_empty() {
        out.push_str(&format!("{}FileId={}\n", indent, header.file_id));
    }
    if !header.creation_time.is_empty() {
        out.push_str(&format!("{}CreationTime={}\n", indent, header.creation_time));
    }
    header.params.iter().for_each(|p| {
        out.push_str(&format!("{}{}={}\n", indent, p.name, p.value));
    });
    header.parents.iter().for_each(|parent| describe_header(parent, depth + 1, out));
}

/// Describes the CEL or CHP file at `path`.
///
/// Returns the file kind and version, followed by the file header and
/// its parents for container files.
///
/// ## Usage
///
/// ```rust
/// use celchp::cel::{write_legacy_cel, CelFile, LegacyCelFormat};
/// use celchp::describe_file;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("sample.CEL");
/// write_legacy_cel(&CelFile::new(2, 2), &path, LegacyCelFormat::Xda).unwrap();
///
/// assert_eq!(describe_file(&path).unwrap(), "CEL XDA (4)\n");
/// ```
///
pub fn describe_file(
    path: &Path,
) -> Result<String, E> {
    let bytes = codec::read_file_head(path, codec::SNIFF_LEN)?;
    let cel = converter::CelFileVersion::sniff(&bytes);
    let chp = converter::ChpFileVersion::sniff(&bytes);

    let mut out = match (cel, chp) {
        (converter::CelFileVersion::Unknown, converter::ChpFileVersion::Unknown) => {
            return Err(Box::new(cel::UnrecognizedFormat{}))
        },
        (converter::CelFileVersion::Unknown, version) => format!("CHP {}\n", version),
        (version, _) => format!("CEL {}\n", version),
    };
    if generic::reader::container_file_type(&bytes).is_some() {
        let header = read_generic_file_header(path)?;
        describe_header(&header, 0, &mut out);
    }
    Ok(out)
}
