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

//! Text (version 3) CEL files.
//!
//! Line oriented with `[SECTION]` headers:
//!
//! ```text
//! [CEL]
//! Version=3
//!
//! [HEADER]
//! Cols=5
//! ...
//!
//! [INTENSITY]
//! NumberCells=25
//! CellHeader=X	Y	MEAN	STDV	NPIXELS
//!   0	  0	0.5	1.3	 10
//!
//! [MASKS]
//! NumberCells=1
//! CellHeader=X	Y
//! 4	4
//!
//! [OUTLIERS]
//! ...
//!
//! [MODIFIED]
//! NumberCells=0
//! CellHeader=X	Y	ORIGMEAN
//! ```
//!
use bstr::BString;

use crate::cel::CelFile;
use crate::codec::narrow;
use crate::codec::widen;
use crate::parameter::atoi;

type E = Box<dyn std::error::Error>;

pub const TEXT_VERSION: i32 = 3;

/// Malformed text CEL file.
#[derive(Debug, Clone)]
pub struct TextFormatError {
    pub line: usize,
    pub what: String,
}

impl std::fmt::Display for TextFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid text CEL file at line {}: {}", self.line, self.what)
    }
}

impl std::error::Error for TextFormatError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Cel,
    Header,
    Intensity,
    Masks,
    Outliers,
    Modified,
    Other,
}

impl Section {
    fn from_line(line: &str) -> Option<Section> {
        let name = line.strip_prefix('[')?.strip_suffix(']')?;
        Some(match name {
            "CEL" => Section::Cel,
            "HEADER" => Section::Header,
            "INTENSITY" => Section::Intensity,
            "MASKS" => Section::Masks,
            "OUTLIERS" => Section::Outliers,
            "MODIFIED" => Section::Modified,
            _ => Section::Other,
        })
    }
}

/// Checks whether `bytes` starts with the `[CEL]` section.
pub fn is_text(
    bytes: &[u8],
) -> bool {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    bytes[start..].starts_with(b"[CEL]")
}

fn coords_block(
    name: &str,
    coords: &[(usize, usize)],
) -> String {
    let mut text = format!("[{}]\nNumberCells={}\nCellHeader=X\tY\n", name, coords.len());
    coords.iter().for_each(|(x, y)| {
        text += &format!("{}\t{}\n", x, y);
    });
    text
}

/// Formats `cel` as a text CEL file.
pub fn encode_text(
    cel: &CelFile,
) -> String {
    let mut text = format!("[CEL]\nVersion={}\n\n", TEXT_VERSION);
    text += "[HEADER]\n";
    text += &cel.header_text();
    text += "\n";

    text += &format!("[INTENSITY]\nNumberCells={}\n", cel.n_cells());
    text += "CellHeader=X\tY\tMEAN\tSTDV\tNPIXELS\n";
    for y in 0..cel.rows {
        for x in 0..cel.cols {
            let idx = cel.index(x, y);
            text += &format!("{:>3}\t{:>3}\t{:.1}\t{:.1}\t{:>3}\n", x, y, cel.intensities[idx], cel.stdevs[idx], cel.pixels[idx]);
        }
    }
    text += "\n";
    text += &coords_block("MASKS", &cel.masked_coords());
    text += "\n";
    text += &coords_block("OUTLIERS", &cel.outlier_coords());
    text += "\n";
    text += "[MODIFIED]\nNumberCells=0\nCellHeader=X\tY\tORIGMEAN\n";
    text
}

/// Encodes `cel` as the bytes of a text CEL file.
pub fn encode_text_bytes(
    cel: &CelFile,
) -> BString {
    narrow(&encode_text(cel))
}

fn parse_coord(
    cel: &CelFile,
    fields: &[&str],
    line: usize,
) -> Result<(usize, usize), TextFormatError> {
    let x = fields.first().map(|x| atoi(x)).unwrap_or(-1);
    let y = fields.get(1).map(|y| atoi(y)).unwrap_or(-1);
    if x < 0 || y < 0 || x as usize >= cel.cols || y as usize >= cel.rows {
        return Err(TextFormatError{ line, what: format!("cell ({}, {}) outside of the {}x{} array", x, y, cel.cols, cel.rows) })
    }
    Ok((x as usize, y as usize))
}

/// Parses a text CEL file.
///
/// Lines may end in `\n` or `\r\n`. The `[MODIFIED]` section is skipped.
pub fn decode_text(
    bytes: &[u8],
) -> Result<CelFile, E> {
    let contents = widen(bytes);
    let mut cel = CelFile::new(0, 0);
    let mut section = Section::None;
    let mut rows: usize = 0;
    let mut cols: usize = 0;
    let mut version: Option<i32> = None;

    for (line_idx, raw_line) in contents.lines().enumerate() {
        let line_nr = line_idx + 1;
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue
        }
        if let Some(next) = Section::from_line(line.trim()) {
            if next == Section::Intensity {
                cel.set_dimensions(rows, cols);
            }
            section = next;
            continue
        }

        match section {
            Section::Cel => {
                if let Some(v) = line.strip_prefix("Version=") {
                    version = Some(atoi(v));
                }
            },
            Section::Header => {
                if let Some((key, value)) = line.split_once('=') {
                    match key {
                        "Cols" => cols = atoi(value).max(0) as usize,
                        "Rows" => rows = atoi(value).max(0) as usize,
                        _ => { cel.apply_header_line(key, value); },
                    }
                }
            },
            Section::Intensity | Section::Masks | Section::Outliers => {
                if line.starts_with("NumberCells=") || line.starts_with("CellHeader=") {
                    continue
                }
                let fields: Vec<&str> = line.split_whitespace().collect();
                let (x, y) = parse_coord(&cel, &fields, line_nr)?;
                match section {
                    Section::Intensity => {
                        if fields.len() < 5 {
                            return Err(Box::new(TextFormatError{ line: line_nr, what: format!("expected 5 fields, got {}", fields.len()) }))
                        }
                        let idx = cel.index(x, y);
                        cel.intensities[idx] = fields[2].parse::<f32>()?;
                        cel.stdevs[idx] = fields[3].parse::<f32>()?;
                        cel.pixels[idx] = atoi(fields[4]) as i16;
                    },
                    Section::Masks => cel.set_masked(x, y, true),
                    _ => cel.set_outlier(x, y, true),
                }
            },
            Section::None | Section::Modified | Section::Other => {},
        }
    }

    match version {
        Some(TEXT_VERSION) => Ok(cel),
        Some(other) => Err(Box::new(TextFormatError{ line: 2, what: format!("unsupported version {}", other) })),
        None => Err(Box::new(TextFormatError{ line: 1, what: "missing [CEL] version".to_string() })),
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn mock_cel() -> crate::cel::CelFile {
        use crate::cel::CelFile;

        let mut cel = CelFile::new(2, 3);
        for idx in 0..6 {
            cel.intensities[idx] = idx as f32 * 10.0 + 0.5;
            cel.stdevs[idx] = 1.5;
            cel.pixels[idx] = 16;
        }
        cel.set_masked(2, 1, true);
        cel.set_outlier(0, 1, true);
        cel.chip_type = "Test3".to_string();
        cel.algorithm = "Percentile".to_string();
        cel.set_param("Percentile", "75");
        cel
    }

    #[test]
    fn encode_text_layout() {
        use super::encode_text;

        let text = encode_text(&mock_cel());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "[CEL]");
        assert_eq!(lines[1], "Version=3");
        assert_eq!(lines[3], "[HEADER]");
        assert_eq!(lines[4], "Cols=3");
        assert_eq!(lines[5], "Rows=2");
        assert!(text.contains("[INTENSITY]\nNumberCells=6\nCellHeader=X\tY\tMEAN\tSTDV\tNPIXELS\n  0\t  0\t0.5\t1.5\t 16\n"));
        assert!(text.contains("[MASKS]\nNumberCells=1\nCellHeader=X\tY\n2\t1\n"));
        assert!(text.contains("[OUTLIERS]\nNumberCells=1\nCellHeader=X\tY\n0\t1\n"));
        assert!(text.ends_with("[MODIFIED]\nNumberCells=0\nCellHeader=X\tY\tORIGMEAN\n"));
    }

    #[test]
    fn decode_encoded_text() {
        use super::{decode_text, encode_text};

        let cel = mock_cel();
        let text = encode_text(&cel).replace('\n', "\r\n");
        let got = decode_text(text.as_bytes()).unwrap();

        assert_eq!(got.rows, 2);
        assert_eq!(got.cols, 3);
        assert_eq!(got.intensities, cel.intensities);
        assert_eq!(got.stdevs, cel.stdevs);
        assert_eq!(got.pixels, cel.pixels);
        assert_eq!(got.masked_coords(), vec![(2, 1)]);
        assert_eq!(got.outlier_coords(), vec![(0, 1)]);
        assert_eq!(got.chip_type, "Test3");
        assert_eq!(got.param("CellMargin"), Some("2"));
    }

    #[test]
    fn is_text_sniff() {
        use super::is_text;

        assert!(is_text(b"[CEL]\r\nVersion=3\r\n"));
        assert!(is_text(b"\n[CEL]\n"));
        assert!(!is_text(b"@\x00\x00\x00"));
    }

    #[test]
    fn cell_outside_array() {
        use super::decode_text;

        let text = "[CEL]\nVersion=3\n\n[HEADER]\nCols=1\nRows=1\n\n[INTENSITY]\nNumberCells=1\n  3\t  0\t1.0\t1.0\t 16\n";

        assert!(decode_text(text.as_bytes()).is_err());
    }

    #[test]
    fn wrong_version() {
        use super::decode_text;

        assert!(decode_text(b"[CEL]\nVersion=2\n").is_err());
    }
}
