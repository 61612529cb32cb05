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

//! Compare the contents of two CEL or two CHP files.
//!
//! Both inputs are read into the legacy model whatever their version, so
//! a container file can be compared against the legacy file it was
//! converted from. Floating point values are equal if they differ by at
//! most the tolerance.
//!
//! The algorithm name, parameters and cell margin of a CEL file are only
//! compared when both inputs are container files or both are legacy
//! files. Converting into the legacy version resets them.
//!
use std::path::Path;

use crate::cel::calvin::is_calvin_cel;
use crate::cel::calvin::read_calvin_cel;
use crate::cel::read_legacy_cel;
use crate::cel::CelFile;
use crate::chp::calvin::is_calvin_chp;
use crate::chp::calvin::read_calvin_chp;
use crate::chp::read_legacy_chp;
use crate::chp::ChpFile;
use crate::chp::ChpResults;
use crate::codec::read_file_bytes;

type E = Box<dyn std::error::Error>;

/// Tolerance used by the command line client.
pub const DEFAULT_TOLERANCE: f32 = 0.0001;

fn close(
    a: f32,
    b: f32,
    tolerance: f32,
) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance
}

fn compare_field<T: PartialEq + std::fmt::Debug>(
    name: &str,
    a: T,
    b: T,
    diffs: &mut Vec<String>,
) {
    if a != b {
        diffs.push(format!("{}: {:?} != {:?}", name, a, b));
    }
}

fn compare_floats(
    name: &str,
    a: &[f32],
    b: &[f32],
    tolerance: f32,
    diffs: &mut Vec<String>,
) {
    if a.len() != b.len() {
        diffs.push(format!("{}: {} values != {} values", name, a.len(), b.len()));
        return
    }
    let n_diff = a.iter().zip(b.iter()).filter(|(x, y)| !close(**x, **y, tolerance)).count();
    if let Some(idx) = a.iter().zip(b.iter()).position(|(x, y)| !close(*x, *y, tolerance)) {
        diffs.push(format!("{}: {} values differ, first at index {}: {} != {}", name, n_diff, idx, a[idx], b[idx]));
    }
}

/// Reads a CEL file of any version into the legacy model.
pub fn read_any_cel(
    path: &Path,
) -> Result<(CelFile, bool), E> {
    let bytes = read_file_bytes(path)?;
    if is_calvin_cel(&bytes) {
        let cel = crate::cel::convert::calvin_to_legacy(&read_calvin_cel(path)?, None)?;
        Ok((cel, true))
    } else {
        let (cel, _) = read_legacy_cel(path)?;
        Ok((cel, false))
    }
}

/// Reads a CHP file of any version into the legacy model.
pub fn read_any_chp(
    path: &Path,
) -> Result<ChpFile, E> {
    let bytes = read_file_bytes(path)?;
    if is_calvin_chp(&bytes) {
        Ok(crate::chp::convert::calvin_to_legacy(&read_calvin_chp(path)?, None))
    } else {
        let (chp, _) = read_legacy_chp(path)?;
        Ok(chp)
    }
}

/// Differences between two legacy CEL models.
///
/// Set `with_algorithm` to also compare the algorithm name, parameters and
/// cell margin.
pub fn compare_cel(
    a: &CelFile,
    b: &CelFile,
    tolerance: f32,
    with_algorithm: bool,
) -> Vec<String> {
    let mut diffs: Vec<String> = Vec::new();
    compare_field("Rows", a.rows, b.rows, &mut diffs);
    compare_field("Cols", a.cols, b.cols, &mut diffs);
    compare_field("ChipType", &a.chip_type, &b.chip_type, &mut diffs);
    compare_field("DatHeader", a.dat_header_text(), b.dat_header_text(), &mut diffs);
    compare_field("Grid", &a.grid, &b.grid, &mut diffs);
    if with_algorithm {
        compare_field("Algorithm", &a.algorithm, &b.algorithm, &mut diffs);
        compare_field("AlgorithmParameters", a.params_text(), b.params_text(), &mut diffs);
        compare_field("CellMargin", a.cell_margin, b.cell_margin, &mut diffs);
    }
    compare_floats("Intensity", &a.intensities, &b.intensities, tolerance, &mut diffs);
    compare_floats("Stdev", &a.stdevs, &b.stdevs, tolerance, &mut diffs);
    compare_field("Pixels", &a.pixels, &b.pixels, &mut diffs);
    compare_field("Outliers", a.outlier_coords(), b.outlier_coords(), &mut diffs);
    compare_field("Masked", a.masked_coords(), b.masked_coords(), &mut diffs);
    diffs
}

/// Differences between the CEL files at `a` and `b`.
///
/// ## Usage
///
/// ```rust
/// use celchp::cel::{write_legacy_cel, CelFile, LegacyCelFormat};
/// use celchp::compare::{compare_cel_files, DEFAULT_TOLERANCE};
///
/// let dir = tempfile::tempdir().unwrap();
/// let (a, b) = (dir.path().join("a.CEL"), dir.path().join("b.CEL"));
/// let mut cel = CelFile::new(2, 2);
/// write_legacy_cel(&cel, &a, LegacyCelFormat::Xda).unwrap();
/// cel.intensities[3] = 100.0;
/// write_legacy_cel(&cel, &b, LegacyCelFormat::Text).unwrap();
///
/// let diffs = compare_cel_files(&a, &b, DEFAULT_TOLERANCE).unwrap();
///
/// assert_eq!(diffs.len(), 1);
/// assert!(diffs[0].starts_with("Intensity"));
/// ```
///
pub fn compare_cel_files(
    a: &Path,
    b: &Path,
    tolerance: f32,
) -> Result<Vec<String>, E> {
    let (cel_a, calvin_a) = read_any_cel(a)?;
    let (cel_b, calvin_b) = read_any_cel(b)?;
    Ok(compare_cel(&cel_a, &cel_b, tolerance, calvin_a == calvin_b))
}

fn compare_results(
    a: &ChpResults,
    b: &ChpResults,
    tolerance: f32,
    diffs: &mut Vec<String>,
) {
    match (a, b) {
        (ChpResults::Expression(x), ChpResults::Expression(y)) => {
            compare_field("Detection", x.iter().map(|e| e.detection).collect::<Vec<u8>>(), y.iter().map(|e| e.detection).collect(), diffs);
            compare_floats("DetectionPValue", &x.iter().map(|e| e.detection_p_value).collect::<Vec<f32>>(), &y.iter().map(|e| e.detection_p_value).collect::<Vec<f32>>(), tolerance, diffs);
            compare_floats("Signal", &x.iter().map(|e| e.signal).collect::<Vec<f32>>(), &y.iter().map(|e| e.signal).collect::<Vec<f32>>(), tolerance, diffs);
            compare_field("NumPairs", x.iter().map(|e| (e.n_pairs, e.n_used_pairs)).collect::<Vec<_>>(), y.iter().map(|e| (e.n_pairs, e.n_used_pairs)).collect(), diffs);
            compare_field("Comparison", x.iter().map(|e| e.comparison.as_ref().map(|c| c.change)).collect::<Vec<_>>(), y.iter().map(|e| e.comparison.as_ref().map(|c| c.change)).collect(), diffs);
        },
        (ChpResults::Genotyping(x), ChpResults::Genotyping(y)) => {
            compare_field("AlleleCall", x.iter().map(|e| e.allele_call).collect::<Vec<u8>>(), y.iter().map(|e| e.allele_call).collect(), diffs);
            compare_floats("Confidence", &x.iter().map(|e| e.confidence).collect::<Vec<f32>>(), &y.iter().map(|e| e.confidence).collect::<Vec<f32>>(), tolerance, diffs);
        },
        (ChpResults::Resequencing(x), ChpResults::Resequencing(y)) => {
            compare_field("Calls", &x.calls, &y.calls, diffs);
            compare_floats("Scores", &x.scores, &y.scores, tolerance, diffs);
            compare_field("ForceCalls", &x.force_calls, &y.force_calls, diffs);
            compare_field("OrigCalls", &x.orig_calls, &y.orig_calls, diffs);
        },
        (ChpResults::Universal(x), ChpResults::Universal(y)) => {
            compare_floats("Background", &x.iter().map(|e| e.background).collect::<Vec<f32>>(), &y.iter().map(|e| e.background).collect::<Vec<f32>>(), tolerance, diffs);
        },
        _ => diffs.push(format!("AssayType: {:?} != {:?}", a.assay_type(), b.assay_type())),
    }
}

/// Differences between two legacy CHP models.
pub fn compare_chp(
    a: &ChpFile,
    b: &ChpFile,
    tolerance: f32,
) -> Vec<String> {
    let mut diffs: Vec<String> = Vec::new();
    compare_field("Rows", a.rows, b.rows, &mut diffs);
    compare_field("Cols", a.cols, b.cols, &mut diffs);
    compare_field("ProgID", &a.prog_id, &b.prog_id, &mut diffs);
    compare_field("ParentCEL", &a.parent_cel, &b.parent_cel, &mut diffs);
    compare_field("ChipType", &a.chip_type, &b.chip_type, &mut diffs);
    compare_field("Algorithm", &a.algorithm_name, &b.algorithm_name, &mut diffs);
    compare_field("AlgorithmVersion", &a.algorithm_version, &b.algorithm_version, &mut diffs);
    compare_field("AlgorithmParameters", &a.algorithm_params, &b.algorithm_params, &mut diffs);
    compare_field("SummaryParameters", &a.summary_params, &b.summary_params, &mut diffs);
    compare_field("NumberEntries", a.n_entries(), b.n_entries(), &mut diffs);
    compare_floats("SmoothFactor", &[a.smooth_factor], &[b.smooth_factor], tolerance, &mut diffs);
    let zones = |chp: &ChpFile| chp.zones.iter().flat_map(|z| [z.center_x, z.center_y, z.background]).collect::<Vec<f32>>();
    compare_floats("BackgroundZones", &zones(a), &zones(b), tolerance, &mut diffs);
    compare_results(&a.results, &b.results, tolerance, &mut diffs);
    diffs
}

/// Differences between the CHP files at `a` and `b`.
pub fn compare_chp_files(
    a: &Path,
    b: &Path,
    tolerance: f32,
) -> Result<Vec<String>, E> {
    let chp_a = read_any_chp(a)?;
    let chp_b = read_any_chp(b)?;
    Ok(compare_chp(&chp_a, &chp_b, tolerance))
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn tolerance() {
        use super::close;

        assert!(close(1.0, 1.00005, 0.0001));
        assert!(!close(1.0, 1.001, 0.0001));
        assert!(close(f32::NAN, f32::NAN, 0.0));
    }

    #[test]
    fn cel_differences() {
        use super::compare_cel;
        use crate::cel::CelFile;

        let a = CelFile::new(3, 3);
        let mut b = a.clone();
        assert!(compare_cel(&a, &b, 0.0001, true).is_empty());

        b.stdevs[4] = 0.5;
        b.set_masked(1, 1, true);
        b.algorithm = "Other".to_string();

        let got = compare_cel(&a, &b, 0.0001, false);
        assert_eq!(got.len(), 2);
        assert!(got[0].starts_with("Stdev: 1 values differ, first at index 4"));
        assert_eq!(got[1], "Masked: [] != [(1, 1)]");
        assert_eq!(compare_cel(&a, &b, 0.0001, true).len(), 3);
    }

    #[test]
    fn cel_against_converted_container() {
        use super::{compare_cel_files, DEFAULT_TOLERANCE};
        use crate::cel::{write_legacy_cel, CelFile, LegacyCelFormat};
        use crate::converter::config::ConverterConfig;
        use crate::converter::{CelFileConverter, CelFileVersion};

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.CEL");
        let b = dir.path().join("b.CEL");
        let mut cel = CelFile::new(4, 4);
        cel.intensities.iter_mut().enumerate().for_each(|(idx, x)| *x = idx as f32 + 0.5);
        cel.chip_type = "Test3".to_string();
        cel.set_outlier(2, 1, true);
        write_legacy_cel(&cel, &a, LegacyCelFormat::Xda).unwrap();

        let mut converter = CelFileConverter::new(ConverterConfig::default());
        converter.convert_file_to(&a, &b, CelFileVersion::Calvin, None).unwrap();

        assert_eq!(compare_cel_files(&a, &b, DEFAULT_TOLERANCE).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn chp_differences() {
        use super::compare_chp;
        use crate::chp::{ChpFile, ChpResults, UniversalResult};

        let a = ChpFile::new(ChpResults::Universal(vec![UniversalResult{ background: 1.0 }, UniversalResult{ background: 2.0 }]));
        let mut b = a.clone();
        assert!(compare_chp(&a, &b, 0.0001).is_empty());

        b.results = ChpResults::Universal(vec![UniversalResult{ background: 1.0 }, UniversalResult{ background: 2.5 }]);
        b.chip_type = "Test3".to_string();
        let got = compare_chp(&a, &b, 0.0001);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], "ChipType: \"\" != \"Test3\"");
        assert!(got[1].starts_with("Background"));
        assert!(compare_chp(&a, &b, 1.0).len() == 1);

        b.results = ChpResults::Expression(Vec::new());
        assert!(compare_chp(&a, &b, 0.0001).iter().any(|d| d.starts_with("AssayType")));
    }
}
