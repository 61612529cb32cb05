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

//! Binary (XDA, version 4) CEL files.
//!
//! ```text
//! i32 magic=64, i32 version=4, i32 rows, i32 cols, i32 cells,
//! ascii header, ascii algorithm, ascii parameters,
//! i32 cell_margin, u32 n_outliers, u32 n_masked, i32 n_subgrids,
//! cells * (f32 intensity, f32 stdev, i16 pixels),
//! n_masked * (i16 x, i16 y), n_outliers * (i16 x, i16 y)
//! ```
//!
//! All integers are little endian.
//!
use std::io::Cursor;
use std::io::Write;

use bincode::{Encode, Decode};
use bincode::decode_from_std_read;
use bincode::encode_into_std_write;

use crate::cel::CelFile;
use crate::codec::legacy_config;
use crate::codec::AsciiString;
use crate::codec::narrow;
use crate::codec::widen;

type E = Box<dyn std::error::Error>;

pub const XDA_MAGIC: i32 = 64;
pub const XDA_VERSION: i32 = 4;

/// Fixed fields at the start of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct XdaPreamble {
    pub magic: i32,
    pub version: i32,
    pub rows: i32,
    pub cols: i32,
    pub n_cells: i32,
}

/// Text fields and counts between the preamble and the cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct XdaHeader {
    pub header: AsciiString,
    pub algorithm: AsciiString,
    pub params: AsciiString,
    pub cell_margin: i32,
    pub n_outliers: u32,
    pub n_masked: u32,
    pub n_subgrids: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct XdaCell {
    pub intensity: f32,
    pub stdev: f32,
    pub pixels: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct XdaCoord {
    pub x: i16,
    pub y: i16,
}

/// Malformed XDA file.
#[derive(Debug, Clone)]
pub struct XdaFormatError {
    pub what: String,
}

impl std::fmt::Display for XdaFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid XDA CEL file: {}", self.what)
    }
}

impl std::error::Error for XdaFormatError {}

/// Checks the magic number and version at the start of `bytes`.
pub fn is_xda(
    bytes: &[u8],
) -> bool {
    match bincode::decode_from_slice::<XdaPreamble, _>(bytes, legacy_config()) {
        Ok((preamble, _)) => preamble.magic == XDA_MAGIC && preamble.version == XDA_VERSION,
        Err(_) => false,
    }
}

fn encode_item<T: Encode, W: Write>(
    item: &T,
    conn: &mut W,
) -> Result<(), E> {
    encode_into_std_write(item, conn, legacy_config())?;
    Ok(())
}

fn to_xda_int<T: TryFrom<usize>>(
    value: usize,
    what: &str,
) -> Result<T, E> {
    T::try_from(value).map_err(|_| Box::new(XdaFormatError{ what: format!("{} {} does not fit in the XDA layout", what, value) }) as E)
}

fn coords_to_xda(
    coords: &[(usize, usize)],
) -> Result<Vec<XdaCoord>, E> {
    coords.iter().map(|(x, y)| {
        Ok(XdaCoord { x: to_xda_int(*x, "cell x")?, y: to_xda_int(*y, "cell y")? })
    }).collect()
}

fn coord_in_array(
    cel: &CelFile,
    coord: &XdaCoord,
) -> Option<(usize, usize)> {
    if coord.x < 0 || coord.y < 0 || coord.x as usize >= cel.cols || coord.y as usize >= cel.rows {
        log::warn!("Ignoring cell ({}, {}) outside of the {}x{} array", coord.x, coord.y, cel.cols, cel.rows);
        return None
    }
    Some((coord.x as usize, coord.y as usize))
}

/// Encodes `cel` as an XDA file.
pub fn encode_xda(
    cel: &CelFile,
) -> Result<Vec<u8>, E> {
    let mut bytes: Vec<u8> = Vec::new();
    let preamble = XdaPreamble {
        magic: XDA_MAGIC,
        version: XDA_VERSION,
        rows: to_xda_int(cel.rows, "row count")?,
        cols: to_xda_int(cel.cols, "column count")?,
        n_cells: to_xda_int(cel.n_cells(), "cell count")?,
    };
    encode_item(&preamble, &mut bytes)?;

    let outliers = coords_to_xda(&cel.outlier_coords())?;
    let masked = coords_to_xda(&cel.masked_coords())?;
    let header = XdaHeader {
        header: AsciiString(narrow(&cel.header_text())),
        algorithm: AsciiString(narrow(&cel.algorithm)),
        params: AsciiString(narrow(&cel.params_text())),
        cell_margin: cel.cell_margin,
        n_outliers: to_xda_int(outliers.len(), "outlier count")?,
        n_masked: to_xda_int(masked.len(), "masked count")?,
        n_subgrids: 0,
    };
    encode_item(&header, &mut bytes)?;

    for idx in 0..cel.n_cells() {
        let cell = XdaCell { intensity: cel.intensities[idx], stdev: cel.stdevs[idx], pixels: cel.pixels[idx] };
        encode_item(&cell, &mut bytes)?;
    }
    for coord in masked.iter().chain(outliers.iter()) {
        encode_item(coord, &mut bytes)?;
    }

    Ok(bytes)
}

/// Decodes an XDA file.
///
/// Model fields are read from the header block, except the algorithm
/// name, parameters and cell margin which have their own fields.
pub fn decode_xda(
    bytes: &[u8],
) -> Result<CelFile, E> {
    let mut conn = Cursor::new(bytes);
    let preamble: XdaPreamble = decode_from_std_read(&mut conn, legacy_config())?;
    if preamble.magic != XDA_MAGIC || preamble.version != XDA_VERSION {
        return Err(Box::new(XdaFormatError{ what: format!("magic {} version {}", preamble.magic, preamble.version) }))
    }
    if preamble.rows < 0 || preamble.cols < 0 || preamble.n_cells as i64 != preamble.rows as i64 * preamble.cols as i64 {
        return Err(Box::new(XdaFormatError{ what: format!("{} cells in a {}x{} array", preamble.n_cells, preamble.rows, preamble.cols) }))
    }
    let header: XdaHeader = decode_from_std_read(&mut conn, legacy_config())?;

    let remaining = bytes.len() - conn.position() as usize;
    let needed = preamble.n_cells as usize * 10 + (header.n_outliers as usize + header.n_masked as usize) * 4;
    if remaining < needed {
        return Err(Box::new(XdaFormatError{ what: format!("{} bytes of cell data, expected {}", remaining, needed) }))
    }

    let mut cel = CelFile::new(preamble.rows as usize, preamble.cols as usize);
    let header_text = widen(&header.header.0);
    header_text.lines().for_each(|line| {
        if let Some((key, value)) = line.split_once('=') {
            cel.apply_header_line(key, value);
        }
    });
    cel.algorithm = widen(&header.algorithm.0);
    cel.set_params_text(&widen(&header.params.0));
    cel.cell_margin = header.cell_margin;

    for idx in 0..cel.n_cells() {
        let cell: XdaCell = decode_from_std_read(&mut conn, legacy_config())?;
        cel.intensities[idx] = cell.intensity;
        cel.stdevs[idx] = cell.stdev;
        cel.pixels[idx] = cell.pixels;
    }
    for _ in 0..header.n_masked {
        let coord: XdaCoord = decode_from_std_read(&mut conn, legacy_config())?;
        if let Some((x, y)) = coord_in_array(&cel, &coord) {
            cel.set_masked(x, y, true);
        }
    }
    for _ in 0..header.n_outliers {
        let coord: XdaCoord = decode_from_std_read(&mut conn, legacy_config())?;
        if let Some((x, y)) = coord_in_array(&cel, &coord) {
            cel.set_outlier(x, y, true);
        }
    }

    Ok(cel)
}
