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

//! Probe set analysis result (CHP) files.
//!
//! [ChpFile] is the legacy model of a CHP file. Which result records it
//! carries depends on the assay:
//!
//!   - Expression: signal, detection call and p-value, and optionally the
//!     fields of a comparison analysis.
//!   - Genotyping: allele call, confidence, RAS1/RAS2 and the per genotype
//!     p-values.
//!   - Resequencing: one call and score per base, plus the force call and
//!     original call lists.
//!   - Universal: a background value only.
//!
//! The legacy model is read from and written to the GCOS binary layout by
//! [xda] and the MAS5 era text layout by [mas5]. [calvin] maps results to
//! and from the container format and [convert] has the copy routines.
//! Probe set names, which only the container format stores, come from
//! the library files handled by [library].
//!
//! ## Usage
//!
//! ```rust
//! use celchp::chp::{ChpFile, ChpResults, UniversalResult};
//! use celchp::chp::xda::{decode_chp_xda, encode_chp_xda};
//!
//! let mut chp = ChpFile::new(ChpResults::Universal(vec![UniversalResult{ background: 12.5 }]));
//! chp.chip_type = "Test3".to_string();
//! chp.algorithm_name = "Background".to_string();
//!
//! let bytes = encode_chp_xda(&chp).unwrap();
//! let got = decode_chp_xda(&bytes).unwrap();
//!
//! assert_eq!(got, chp);
//! ```
//!

pub mod calvin;
pub mod convert;
pub mod library;
pub mod mas5;
pub mod xda;

use std::path::Path;

use bincode::{Encode, Decode};

use indexmap::IndexMap;

use crate::codec::read_file_bytes;

type E = Box<dyn std::error::Error>;

/// Input that is not a legacy CHP file.
#[derive(Debug, Clone)]
pub struct UnrecognizedChpFormat;

impl std::fmt::Display for UnrecognizedChpFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Unrecognized CHP file format")
    }
}

impl std::error::Error for UnrecognizedChpFormat {}

/// Legacy CHP layouts.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LegacyChpFormat {
    #[default]
    Gcos,
    Mas5,
}

/// Kind of analysis a CHP file holds results for.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssayType {
    #[default]
    Expression,
    Genotyping,
    Resequencing,
    Universal,
}

impl AssayType {
    pub fn from_i32(value: i32) -> Option<AssayType> {
        match value {
            0 => Some(AssayType::Expression),
            1 => Some(AssayType::Genotyping),
            2 => Some(AssayType::Resequencing),
            3 => Some(AssayType::Universal),
            _ => None,
        }
    }

    pub fn to_i32(&self) -> i32 {
        match self {
            AssayType::Expression => 0,
            AssayType::Genotyping => 1,
            AssayType::Resequencing => 2,
            AssayType::Universal => 3,
        }
    }

    /// File type id of a container CHP file with this assay.
    pub fn container_type_id(&self) -> &'static str {
        match self {
            AssayType::Expression => "affymetrix-expression-probeset-analysis",
            AssayType::Genotyping => "affymetrix-genotyping-probeset-analysis",
            AssayType::Resequencing => "affymetrix-resequencing-probeset-analysis",
            AssayType::Universal => "affymetrix-universal-probeset-analysis",
        }
    }

    pub fn from_container_type_id(type_id: &str) -> Option<AssayType> {
        [AssayType::Expression, AssayType::Genotyping, AssayType::Resequencing, AssayType::Universal]
            .into_iter()
            .find(|x| x.container_type_id() == type_id)
    }

    /// Name used in the text layout.
    pub fn name(&self) -> &'static str {
        match self {
            AssayType::Expression => "Expression",
            AssayType::Genotyping => "Genotyping",
            AssayType::Resequencing => "Resequencing",
            AssayType::Universal => "Universal",
        }
    }

    pub fn from_name(name: &str) -> Option<AssayType> {
        [AssayType::Expression, AssayType::Genotyping, AssayType::Resequencing, AssayType::Universal]
            .into_iter()
            .find(|x| x.name() == name)
    }
}

/// Comparison analysis fields of an expression result.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct ComparisonResult {
    pub change: u8,
    pub change_p_value: f32,
    pub signal_log_ratio: f32,
    pub signal_log_ratio_low: f32,
    pub signal_log_ratio_high: f32,
    pub n_common_pairs: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionResult {
    pub detection: u8,
    pub detection_p_value: f32,
    pub signal: f32,
    pub n_pairs: u16,
    pub n_used_pairs: u16,
    pub comparison: Option<ComparisonResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct GenotypeResult {
    pub allele_call: u8,
    pub confidence: f32,
    pub ras1: f32,
    pub ras2: f32,
    pub p_value_aa: f32,
    pub p_value_ab: f32,
    pub p_value_bb: f32,
    pub p_value_no_call: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct UniversalResult {
    pub background: f32,
}

/// Base call replaced by a forced call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ForceCall {
    pub position: i32,
    pub call: u8,
    pub reason: u8,
}

/// Base call before it was replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct OrigCall {
    pub position: i32,
    pub call: u8,
}

/// Resequencing results.
///
/// The force call and original call lists are independent of the number
/// of called bases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResequencingResults {
    pub calls: Vec<u8>,
    pub scores: Vec<f32>,
    pub force_calls: Vec<ForceCall>,
    pub orig_calls: Vec<OrigCall>,
}

/// Result records of one assay.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ChpResults {
    Expression(Vec<ExpressionResult>),
    Genotyping(Vec<GenotypeResult>),
    Resequencing(ResequencingResults),
    Universal(Vec<UniversalResult>),
}

impl Default for ChpResults {
    fn default() -> Self {
        ChpResults::Expression(Vec::new())
    }
}

impl ChpResults {
    pub fn assay_type(&self) -> AssayType {
        match self {
            ChpResults::Expression(_) => AssayType::Expression,
            ChpResults::Genotyping(_) => AssayType::Genotyping,
            ChpResults::Resequencing(_) => AssayType::Resequencing,
            ChpResults::Universal(_) => AssayType::Universal,
        }
    }

    /// Number of entries; called bases for resequencing.
    pub fn len(&self) -> usize {
        match self {
            ChpResults::Expression(x) => x.len(),
            ChpResults::Genotyping(x) => x.len(),
            ChpResults::Resequencing(x) => x.calls.len(),
            ChpResults::Universal(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the expression results carry comparison fields.
    ///
    /// Decided by the first entry.
    pub fn has_comparison(&self) -> bool {
        match self {
            ChpResults::Expression(x) => x.first().is_some_and(|e| e.comparison.is_some()),
            _ => false,
        }
    }
}

/// Background intensity of one zone of the array.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct BackgroundZone {
    pub center_x: f32,
    pub center_y: f32,
    pub background: f32,
}

/// Legacy CHP file contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChpFile {
    pub rows: u16,
    pub cols: u16,
    pub prog_id: String,
    pub parent_cel: String,
    pub chip_type: String,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub algorithm_params: IndexMap<String, String>,
    pub summary_params: IndexMap<String, String>,
    pub smooth_factor: f32,
    pub zones: Vec<BackgroundZone>,
    pub results: ChpResults,
}

impl ChpFile {
    pub fn new(results: ChpResults) -> Self {
        ChpFile { results, ..Default::default() }
    }

    pub fn assay_type(&self) -> AssayType {
        self.results.assay_type()
    }

    pub fn n_entries(&self) -> usize {
        self.results.len()
    }
}

/// Reads a legacy CHP file in either layout.
pub fn read_legacy_chp(
    path: &Path,
) -> Result<(ChpFile, LegacyChpFormat), E> {
    let bytes = read_file_bytes(path)?;
    if xda::is_chp_xda(&bytes) {
        Ok((xda::decode_chp_xda(&bytes)?, LegacyChpFormat::Gcos))
    } else if mas5::is_mas5(&bytes) {
        Ok((mas5::decode_mas5(&bytes)?, LegacyChpFormat::Mas5))
    } else {
        Err(Box::new(UnrecognizedChpFormat{}))
    }
}

/// Writes `chp` to `path` in `format`.
pub fn write_legacy_chp(
    chp: &ChpFile,
    path: &Path,
    format: LegacyChpFormat,
) -> Result<(), E> {
    let bytes = match format {
        LegacyChpFormat::Gcos => xda::encode_chp_xda(chp)?,
        LegacyChpFormat::Mas5 => Vec::from(mas5::encode_mas5_bytes(chp)),
    };
    std::fs::write(path, bytes)?;
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn assay_type_ids() {
        use super::AssayType;

        assert_eq!(AssayType::from_i32(2), Some(AssayType::Resequencing));
        assert_eq!(AssayType::from_i32(4), None);
        assert_eq!(AssayType::Universal.to_i32(), 3);
        assert_eq!(AssayType::Expression.container_type_id(), "affymetrix-expression-probeset-analysis");
        assert_eq!(AssayType::from_container_type_id("affymetrix-genotyping-probeset-analysis"), Some(AssayType::Genotyping));
        assert_eq!(AssayType::from_name("Universal"), Some(AssayType::Universal));
    }

    #[test]
    fn has_comparison_from_first_entry() {
        use super::{ChpResults, ComparisonResult, ExpressionResult};

        let plain = ChpResults::Expression(vec![ExpressionResult::default()]);
        let compared = ChpResults::Expression(vec![ExpressionResult { comparison: Some(ComparisonResult::default()), ..Default::default() }]);

        assert!(!plain.has_comparison());
        assert!(compared.has_comparison());
        assert!(!ChpResults::Expression(Vec::new()).has_comparison());
    }

    #[test]
    fn resequencing_length_is_called_bases() {
        use super::{ChpResults, ForceCall, ResequencingResults};

        let results = ChpResults::Resequencing(ResequencingResults {
            calls: vec![b'A', b'C', b'G'],
            scores: vec![1.0, 2.0, 3.0],
            force_calls: vec![ForceCall { position: 1, call: b'N', reason: 1 }],
            orig_calls: Vec::new(),
        });

        assert_eq!(results.len(), 3);
    }

    #[test]
    fn read_unrecognized_chp() {
        use super::read_legacy_chp;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notachp.CHP");
        std::fs::write(&path, b"[CEL]\nVersion=3\n").unwrap();

        assert!(read_legacy_chp(&path).is_err());
    }
}
