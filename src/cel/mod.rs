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

//! Probe intensity (CEL) files.
//!
//! [CelFile] is the in-memory model of a legacy CEL file. It is read from
//! and written to the two legacy layouts by [xda] (binary, version 4) and
//! [text] (line oriented, version 3), and mapped to and from the generic
//! container format by [calvin]. The field-by-field copy routines between
//! the container view and the legacy model are in [convert].
//!
//! Outlier and masked cells are kept as [RoaringBitmap]s of cell indexes,
//! where the index of the cell at column `x` and row `y` is `y * cols + x`.
//!
//! ## Usage
//!
//! ```rust
//! use celchp::cel::CelFile;
//! use celchp::cel::xda::{encode_xda, decode_xda};
//!
//! let mut cel = CelFile::new(5, 5);
//! cel.chip_type = "Test3".to_string();
//! cel.intensities[7] = 1024.5;
//! cel.set_outlier(2, 1, true);
//! cel.set_masked(4, 4, true);
//!
//! let bytes = encode_xda(&cel).unwrap();
//! let got = decode_xda(&bytes).unwrap();
//!
//! assert_eq!(got.intensity(2, 1), 1024.5);
//! assert!(got.is_outlier(2, 1));
//! assert!(got.is_masked(4, 4));
//! assert_eq!(got.chip_type, "Test3");
//! ```
//!

pub mod calvin;
pub mod convert;
pub mod dat_header;
pub mod text;
pub mod xda;

use std::path::Path;

use indexmap::IndexMap;

use roaring::RoaringBitmap;

use crate::codec::read_file_bytes;
use crate::parameter::atoi;

type E = Box<dyn std::error::Error>;

pub const DEFAULT_CELL_MARGIN: i32 = 2;

/// Input that is not a legacy CEL file.
#[derive(Debug, Clone)]
pub struct UnrecognizedFormat;

impl std::fmt::Display for UnrecognizedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Unrecognized CEL file format")
    }
}

impl std::error::Error for UnrecognizedFormat {}

/// Legacy CEL layouts.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LegacyCelFormat {
    Text,
    #[default]
    Xda,
}

/// Corner coordinates of the grid aligned on the scanned image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridCoordinates {
    pub upper_left_x: i32,
    pub upper_left_y: i32,
    pub upper_right_x: i32,
    pub upper_right_y: i32,
    pub lower_right_x: i32,
    pub lower_right_y: i32,
    pub lower_left_x: i32,
    pub lower_left_y: i32,
}

/// Legacy CEL file contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CelFile {
    pub rows: usize,
    pub cols: usize,
    pub intensities: Vec<f32>,
    pub stdevs: Vec<f32>,
    pub pixels: Vec<i16>,
    pub outliers: RoaringBitmap,
    pub masked: RoaringBitmap,
    pub grid: GridCoordinates,
    pub chip_type: String,
    pub algorithm: String,
    pub params: IndexMap<String, String>,
    pub dat_header: String,
    pub cell_margin: i32,
}

impl CelFile {
    pub fn new(
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut cel = CelFile { cell_margin: DEFAULT_CELL_MARGIN, ..Default::default() };
        cel.set_dimensions(rows, cols);
        cel
    }

    /// Resizes the cell arrays to `rows * cols` cells and clears the
    /// outlier and mask sets.
    pub fn set_dimensions(
        &mut self,
        rows: usize,
        cols: usize,
    ) {
        self.rows = rows;
        self.cols = cols;
        let n_cells = rows * cols;
        self.intensities = vec![0.0; n_cells];
        self.stdevs = vec![0.0; n_cells];
        self.pixels = vec![0; n_cells];
        self.outliers.clear();
        self.masked.clear();
    }

    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.cols + x
    }

    /// (x, y) coordinates of cell `idx`.
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        if self.cols == 0 { (0, 0) } else { (idx % self.cols, idx / self.cols) }
    }

    pub fn intensity(&self, x: usize, y: usize) -> f32 { self.intensities[self.index(x, y)] }
    pub fn stdev(&self, x: usize, y: usize) -> f32 { self.stdevs[self.index(x, y)] }
    pub fn pixel_count(&self, x: usize, y: usize) -> i16 { self.pixels[self.index(x, y)] }

    pub fn is_outlier(&self, x: usize, y: usize) -> bool {
        self.outliers.contains(self.index(x, y) as u32)
    }

    pub fn is_masked(&self, x: usize, y: usize) -> bool {
        self.masked.contains(self.index(x, y) as u32)
    }

    pub fn set_outlier(
        &mut self,
        x: usize,
        y: usize,
        outlier: bool,
    ) {
        let idx = self.index(x, y) as u32;
        if outlier { self.outliers.insert(idx); } else { self.outliers.remove(idx); }
    }

    pub fn set_masked(
        &mut self,
        x: usize,
        y: usize,
        masked: bool,
    ) {
        let idx = self.index(x, y) as u32;
        if masked { self.masked.insert(idx); } else { self.masked.remove(idx); }
    }

    /// Outlier coordinates as (x, y) pairs in cell index order.
    pub fn outlier_coords(&self) -> Vec<(usize, usize)> {
        self.outliers.iter().map(|idx| self.coords(idx as usize)).collect()
    }

    /// Masked coordinates as (x, y) pairs in cell index order.
    pub fn masked_coords(&self) -> Vec<(usize, usize)> {
        self.masked.iter().map(|idx| self.coords(idx as usize)).collect()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    /// Sets algorithm parameter `name`, keeping its position if it exists.
    pub fn set_param(
        &mut self,
        name: &str,
        value: &str,
    ) {
        self.params.insert(name.to_string(), value.to_string());
    }

    /// Algorithm parameters as `tag:value;tag:value`.
    ///
    /// CellMargin is appended from the cell margin field when it is not
    /// one of the parameters.
    pub fn params_text(&self) -> String {
        let mut fields: Vec<String> = self.params.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
        if !self.params.contains_key("CellMargin") {
            fields.push(format!("CellMargin:{}", self.cell_margin));
        }
        fields.join(";")
    }

    /// Parses `tag:value;tag:value` into the algorithm parameters.
    ///
    /// A CellMargin parameter also updates the cell margin field.
    pub fn set_params_text(
        &mut self,
        text: &str,
    ) {
        self.params.clear();
        text.split(';').filter(|x| !x.is_empty()).for_each(|field| {
            let (tag, value) = field.split_once(':').unwrap_or((field, ""));
            self.params.insert(tag.to_string(), value.to_string());
        });
        if let Some(margin) = self.params.get("CellMargin") {
            self.cell_margin = atoi(margin);
        }
    }

    /// DAT header with the current chip type in the `.1sq` field.
    pub fn dat_header_text(&self) -> String {
        if self.dat_header.is_empty() {
            dat_header::default_dat_header(&self.chip_type)
        } else {
            dat_header::substitute_chip_type(&self.dat_header, &self.chip_type)
        }
    }

    /// Header block shared by the text and binary layouts.
    pub fn header_text(&self) -> String {
        let g = &self.grid;
        let mut text = String::new();
        text += &format!("Cols={}\nRows={}\n", self.cols, self.rows);
        text += &format!("TotalX={}\nTotalY={}\n", self.cols, self.rows);
        text += "OffsetX=0\nOffsetY=0\n";
        text += &format!("GridCornerUL={} {}\n", g.upper_left_x, g.upper_left_y);
        text += &format!("GridCornerUR={} {}\n", g.upper_right_x, g.upper_right_y);
        text += &format!("GridCornerLR={} {}\n", g.lower_right_x, g.lower_right_y);
        text += &format!("GridCornerLL={} {}\n", g.lower_left_x, g.lower_left_y);
        text += "Axis-invertX=0\nAxisInvertY=0\nswapXY=0\n";
        text += &format!("DatHeader={}\n", self.dat_header_text());
        text += &format!("Algorithm={}\n", self.algorithm);
        text += &format!("AlgorithmParameters={}\n", self.params_text());
        text
    }

    /// Applies one `key=value` line of the header block.
    ///
    /// Returns false for keys that are not part of the model.
    pub fn apply_header_line(
        &mut self,
        key: &str,
        value: &str,
    ) -> bool {
        fn corner(value: &str) -> (i32, i32) {
            let mut it = value.split_whitespace().map(atoi);
            (it.next().unwrap_or(0), it.next().unwrap_or(0))
        }
        match key {
            "GridCornerUL" => (self.grid.upper_left_x, self.grid.upper_left_y) = corner(value),
            "GridCornerUR" => (self.grid.upper_right_x, self.grid.upper_right_y) = corner(value),
            "GridCornerLR" => (self.grid.lower_right_x, self.grid.lower_right_y) = corner(value),
            "GridCornerLL" => (self.grid.lower_left_x, self.grid.lower_left_y) = corner(value),
            "DatHeader" => {
                self.dat_header = value.to_string();
                self.chip_type = dat_header::chip_type_from_dat_header(value);
            },
            "Algorithm" => self.algorithm = value.to_string(),
            "AlgorithmParameters" => self.set_params_text(value),
            _ => return false,
        }
        true
    }
}

/// Reads a legacy CEL file in either layout, inflating gzip input.
pub fn read_legacy_cel(
    path: &Path,
) -> Result<(CelFile, LegacyCelFormat), E> {
    let bytes = read_file_bytes(path)?;
    if xda::is_xda(&bytes) {
        Ok((xda::decode_xda(&bytes)?, LegacyCelFormat::Xda))
    } else if text::is_text(&bytes) {
        Ok((text::decode_text(&bytes)?, LegacyCelFormat::Text))
    } else {
        Err(Box::new(UnrecognizedFormat{}))
    }
}

/// Writes `cel` to `path` in `format`.
pub fn write_legacy_cel(
    cel: &CelFile,
    path: &Path,
    format: LegacyCelFormat,
) -> Result<(), E> {
    let bytes = match format {
        LegacyCelFormat::Xda => xda::encode_xda(cel)?,
        LegacyCelFormat::Text => Vec::from(text::encode_text_bytes(cel)),
    };
    std::fs::write(path, bytes)?;
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn index_and_coords() {
        use super::CelFile;

        let cel = CelFile::new(4, 5);

        assert_eq!(cel.n_cells(), 20);
        assert_eq!(cel.index(3, 2), 13);
        assert_eq!(cel.coords(13), (3, 2));
    }

    #[test]
    fn outlier_and_mask_membership() {
        use super::CelFile;

        let mut cel = CelFile::new(5, 5);
        cel.set_outlier(1, 0, true);
        cel.set_outlier(3, 4, true);
        cel.set_masked(2, 2, true);
        cel.set_outlier(1, 0, false);

        assert_eq!(cel.outlier_coords(), vec![(3, 4)]);
        assert_eq!(cel.masked_coords(), vec![(2, 2)]);
        assert!(!cel.is_masked(3, 4));
    }

    #[test]
    fn header_text() {
        use super::{CelFile, GridCoordinates};

        let mut cel = CelFile::new(5, 5);
        cel.grid = GridCoordinates {
            upper_left_x: 1, upper_left_y: 2, upper_right_x: 3, upper_right_y: 4,
            lower_right_x: 5, lower_right_y: 6, lower_left_x: 7, lower_left_y: 8,
        };
        cel.chip_type = "chip type".to_string();
        cel.algorithm = "alg".to_string();
        cel.set_param("tag1", "value1");
        cel.set_param("tag2", "value2");

        let mut expected = "Cols=5\nRows=5\nTotalX=5\nTotalY=5\nOffsetX=0\nOffsetY=0\n".to_string();
        expected += "GridCornerUL=1 2\nGridCornerUR=3 4\nGridCornerLR=5 6\nGridCornerLL=7 8\n";
        expected += "Axis-invertX=0\nAxisInvertY=0\nswapXY=0\nDatHeader=";
        expected += " \x14 \x14 chip type.1sq \x14 \x14 \x14 \x14 \x14 \x14 \x14 \x14 \x14 ";
        expected += "\nAlgorithm=alg\nAlgorithmParameters=tag1:value1;tag2:value2;CellMargin:2\n";

        assert_eq!(cel.header_text(), expected);
    }

    #[test]
    fn params_text_sets_cell_margin() {
        use super::CelFile;

        let mut cel = CelFile::new(1, 1);
        cel.set_params_text("Percentile:75;CellMargin:4;OutlierHigh:1.500");

        assert_eq!(cel.cell_margin, 4);
        assert_eq!(cel.param("OutlierHigh"), Some("1.500"));
        assert_eq!(cel.params_text(), "Percentile:75;CellMargin:4;OutlierHigh:1.500");
    }

    #[test]
    fn read_unrecognized_file() {
        use super::read_legacy_cel;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notacel.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert!(read_legacy_cel(&path).is_err());
    }
}
