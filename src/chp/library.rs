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

//! Probe set names from the array library files.
//!
//! A PSI file lists one probe set per line after a `#Probe Sets=N`
//! line:
//!
//! ```text
//! #Probe Sets=2
//! 0	AFFX-BioB-5_at	20
//! 1	AFFX-BioB-M_at	20
//! ```
//!
//! A text CDF file names each probe set in the first block of its unit:
//!
//! ```text
//! [Unit1000_Block1]
//! Name=AFFX-BioB-5_at
//! ```
//!
use std::path::Path;

use crate::chp::AssayType;
use crate::codec::read_file_bytes;
use crate::codec::widen;

type E = Box<dyn std::error::Error>;

/// Malformed library file.
#[derive(Debug, Clone)]
pub struct LibraryFormatError {
    pub line: usize,
    pub what: String,
}

impl std::fmt::Display for LibraryFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid library file at line {}: {}", self.line, self.what)
    }
}

impl std::error::Error for LibraryFormatError {}

/// Parses the probe set names of a PSI file.
pub fn decode_psi(
    bytes: &[u8],
) -> Result<Vec<String>, E> {
    let contents = widen(bytes);
    let mut names: Vec<String> = Vec::new();
    for (line_idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue
        }
        let name = line.split('\t').nth(1)
            .ok_or(LibraryFormatError{ line: line_idx + 1, what: "missing probe set name".to_string() })?;
        names.push(name.to_string());
    }
    Ok(names)
}

fn is_first_block(
    section: &str,
) -> bool {
    section.strip_prefix("Unit")
        .and_then(|x| x.strip_suffix("_Block1"))
        .is_some_and(|x| !x.is_empty() && x.bytes().all(|b| b.is_ascii_digit()))
}

/// Parses the probe set names of a text CDF file.
pub fn decode_cdf_names(
    bytes: &[u8],
) -> Result<Vec<String>, E> {
    let contents = widen(bytes);
    if !contents.trim_start().starts_with("[CDF]") {
        return Err(Box::new(LibraryFormatError{ line: 1, what: "missing [CDF] section".to_string() }))
    }
    let mut names: Vec<String> = Vec::new();
    let mut in_block = false;
    for raw_line in contents.lines() {
        let line = raw_line.trim_end_matches('\r').trim();
        if let Some(section) = line.strip_prefix('[').and_then(|x| x.strip_suffix(']')) {
            in_block = is_first_block(section);
            continue
        }
        if in_block {
            if let Some(name) = line.strip_prefix("Name=") {
                names.push(name.to_string());
                in_block = false;
            }
        }
    }
    Ok(names)
}

fn try_read(
    path: &Path,
    decode: fn(&[u8]) -> Result<Vec<String>, E>,
) -> Vec<String> {
    match read_file_bytes(path).and_then(|bytes| decode(&bytes)) {
        Ok(names) => names,
        Err(e) => {
            log::debug!("No probe set names from {}: {}", path.display(), e);
            Vec::new()
        },
    }
}

/// Probe set names for a CHP file of `chip_type`.
///
/// Expression and genotyping arrays are looked up in
/// `<library_path>/<chip_type>.PSI` first, then every assay in
/// `<library_path>/<chip_type>.CDF`. Resequencing arrays have no probe
/// set names and return an empty list.
///
/// Returns None if no names were found.
pub fn load_probe_set_names(
    library_path: &Path,
    chip_type: &str,
    assay_type: AssayType,
) -> Option<Vec<String>> {
    if assay_type == AssayType::Resequencing {
        return Some(Vec::new())
    }
    let mut names: Vec<String> = Vec::new();
    if assay_type == AssayType::Expression || assay_type == AssayType::Genotyping {
        names = try_read(&library_path.join(format!("{}.PSI", chip_type)), decode_psi);
    }
    if names.is_empty() {
        names = try_read(&library_path.join(format!("{}.CDF", chip_type)), decode_cdf_names);
    }
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

// Tests
#[cfg(test)]
mod tests {

    const CDF: &str = "[CDF]\nVersion=GC3.0\n\n[Chip]\nName=Test3\nNumberOfUnits=2\n\n[Unit1000]\nName=NONE\n\n[Unit1000_Block1]\nName=AFFX-BioB-5_at\nBlockNumber=1\n\n[Unit1001]\nName=NONE\n\n[Unit1001_Block1]\nName=AFFX-BioB-M_at\n";

    #[test]
    fn decode_psi_names() {
        use super::decode_psi;

        let psi = b"#Probe Sets=2\r\n0\tAFFX-BioB-5_at\t20\r\n1\tAFFX-BioB-M_at\t20\r\n";

        assert_eq!(decode_psi(psi).unwrap(), vec!["AFFX-BioB-5_at", "AFFX-BioB-M_at"]);
    }

    #[test]
    fn decode_cdf_first_blocks() {
        use super::decode_cdf_names;

        assert_eq!(decode_cdf_names(CDF.as_bytes()).unwrap(), vec!["AFFX-BioB-5_at", "AFFX-BioB-M_at"]);
        assert!(decode_cdf_names(b"[CEL]\nVersion=3\n").is_err());
    }

    #[test]
    fn psi_before_cdf() {
        use super::load_probe_set_names;
        use crate::chp::AssayType;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Test3.CDF"), CDF).unwrap();

        assert_eq!(load_probe_set_names(dir.path(), "Test3", AssayType::Expression).unwrap().len(), 2);

        std::fs::write(dir.path().join("Test3.PSI"), "#Probe Sets=1\n0\tfrom_psi\t11\n").unwrap();
        assert_eq!(load_probe_set_names(dir.path(), "Test3", AssayType::Genotyping).unwrap(), vec!["from_psi"]);
        // universal arrays skip the PSI file
        assert_eq!(load_probe_set_names(dir.path(), "Test3", AssayType::Universal).unwrap().len(), 2);
    }

    #[test]
    fn no_library_files() {
        use super::load_probe_set_names;
        use crate::chp::AssayType;

        let dir = tempfile::tempdir().unwrap();

        assert!(load_probe_set_names(dir.path(), "Test3", AssayType::Expression).is_none());
        assert_eq!(load_probe_set_names(dir.path(), "Test3", AssayType::Resequencing), Some(Vec::new()));
    }
}
