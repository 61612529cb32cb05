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

//! MAS5 era text CHP files.
//!
//! ```text
//! GeneChip Sequence File
//! [HEADER]
//! AssayType=Expression
//! Cols=5
//! Rows=5
//! ...
//!
//! [ALGORITHM]
//! Alpha1=0.04
//!
//! [SUMMARY]
//! RawQ=1.23
//!
//! [BACKGROUND]
//! NumberZones=1
//! 1	2	30.5
//!
//! [RESULTS]
//! NumberEntries=3
//! 0	0	100	16	15
//! ```
//!
//! Result rows are tab separated with the fields of the GCOS binary
//! entries in the same order. Resequencing files end in `[FORCE]` and
//! `[ORIG]` sections. Floats are written in their shortest exact form.
//!
use bstr::BString;

use indexmap::IndexMap;

use crate::chp::AssayType;
use crate::chp::BackgroundZone;
use crate::chp::ChpFile;
use crate::chp::ChpResults;
use crate::chp::ComparisonResult;
use crate::chp::ExpressionResult;
use crate::chp::ForceCall;
use crate::chp::GenotypeResult;
use crate::chp::OrigCall;
use crate::chp::ResequencingResults;
use crate::chp::UniversalResult;
use crate::codec::narrow;
use crate::codec::widen;
use crate::parameter::atoi;

type E = Box<dyn std::error::Error>;

pub const MAS5_MAGIC: &str = "GeneChip Sequence File";

/// Malformed MAS5 CHP file.
#[derive(Debug, Clone)]
pub struct Mas5FormatError {
    pub line: usize,
    pub what: String,
}

impl std::fmt::Display for Mas5FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid MAS5 CHP file at line {}: {}", self.line, self.what)
    }
}

impl std::error::Error for Mas5FormatError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Header,
    Algorithm,
    Summary,
    Background,
    Results,
    Force,
    Orig,
    Other,
}

impl Section {
    fn from_line(line: &str) -> Option<Section> {
        let name = line.strip_prefix('[')?.strip_suffix(']')?;
        Some(match name {
            "HEADER" => Section::Header,
            "ALGORITHM" => Section::Algorithm,
            "SUMMARY" => Section::Summary,
            "BACKGROUND" => Section::Background,
            "RESULTS" => Section::Results,
            "FORCE" => Section::Force,
            "ORIG" => Section::Orig,
            _ => Section::Other,
        })
    }
}

/// Checks whether the first line of `bytes` is the MAS5 magic line.
pub fn is_mas5(
    bytes: &[u8],
) -> bool {
    let first = bytes.split(|b| *b == b'\n').next().unwrap_or(&[]);
    first.strip_suffix(b"\r").unwrap_or(first) == MAS5_MAGIC.as_bytes()
}

fn params_block(
    name: &str,
    params: &IndexMap<String, String>,
) -> String {
    let mut text = format!("[{}]\n", name);
    params.iter().for_each(|(tag, value)| {
        text += &format!("{}={}\n", tag, value);
    });
    text
}

fn expression_row(
    entry: &ExpressionResult,
    has_comparison: bool,
) -> String {
    let mut row = format!("{}\t{}\t{}\t{}\t{}", entry.detection, entry.detection_p_value, entry.signal, entry.n_pairs, entry.n_used_pairs);
    if has_comparison {
        let c = entry.comparison.clone().unwrap_or_default();
        row += &format!("\t{}\t{}\t{}\t{}\t{}\t{}", c.change, c.change_p_value, c.signal_log_ratio, c.signal_log_ratio_low, c.signal_log_ratio_high, c.n_common_pairs);
    }
    row
}

/// Formats `chp` as a MAS5 CHP file.
pub fn encode_mas5(
    chp: &ChpFile,
) -> String {
    let has_comparison = chp.results.has_comparison();
    let mut text = format!("{}\n", MAS5_MAGIC);
    text += "[HEADER]\n";
    text += &format!("AssayType={}\n", chp.assay_type().name());
    text += &format!("Cols={}\nRows={}\n", chp.cols, chp.rows);
    text += &format!("ProgID={}\n", chp.prog_id);
    text += &format!("ParentCEL={}\n", chp.parent_cel);
    text += &format!("ChipType={}\n", chp.chip_type);
    text += &format!("Algorithm={}\n", chp.algorithm_name);
    text += &format!("AlgorithmVersion={}\n", chp.algorithm_version);
    text += &format!("HasComparison={}\n", has_comparison as u8);
    text += &format!("SmoothFactor={}\n", chp.smooth_factor);
    text += "\n";
    text += &params_block("ALGORITHM", &chp.algorithm_params);
    text += "\n";
    text += &params_block("SUMMARY", &chp.summary_params);
    text += "\n";

    text += &format!("[BACKGROUND]\nNumberZones={}\n", chp.zones.len());
    chp.zones.iter().for_each(|z| {
        text += &format!("{}\t{}\t{}\n", z.center_x, z.center_y, z.background);
    });
    text += "\n";

    text += &format!("[RESULTS]\nNumberEntries={}\n", chp.n_entries());
    match &chp.results {
        ChpResults::Expression(entries) => entries.iter().for_each(|e| {
            text += &expression_row(e, has_comparison);
            text += "\n";
        }),
        ChpResults::Genotyping(entries) => entries.iter().for_each(|e| {
            text += &format!("{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n", e.allele_call, e.confidence, e.ras1, e.ras2, e.p_value_aa, e.p_value_ab, e.p_value_bb, e.p_value_no_call);
        }),
        ChpResults::Universal(entries) => entries.iter().for_each(|e| {
            text += &format!("{}\n", e.background);
        }),
        ChpResults::Resequencing(reseq) => {
            reseq.calls.iter().zip(reseq.scores.iter()).for_each(|(call, score)| {
                text += &format!("{}\t{}\n", call, score);
            });
            text += &format!("\n[FORCE]\nNumberCalls={}\n", reseq.force_calls.len());
            reseq.force_calls.iter().for_each(|x| {
                text += &format!("{}\t{}\t{}\n", x.position, x.call, x.reason);
            });
            text += &format!("\n[ORIG]\nNumberCalls={}\n", reseq.orig_calls.len());
            reseq.orig_calls.iter().for_each(|x| {
                text += &format!("{}\t{}\n", x.position, x.call);
            });
        },
    }
    text
}

/// Encodes `chp` as the bytes of a MAS5 CHP file.
pub fn encode_mas5_bytes(
    chp: &ChpFile,
) -> BString {
    narrow(&encode_mas5(chp))
}

/// Tab separated row and the line it came from.
struct Row<'a> {
    line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Row<'a> {
    fn field<T: std::str::FromStr>(
        &self,
        idx: usize,
    ) -> Result<T, Mas5FormatError> {
        let value = self.fields.get(idx)
            .ok_or(Mas5FormatError{ line: self.line, what: format!("missing field {}", idx + 1) })?;
        value.trim().parse::<T>()
            .map_err(|_| Mas5FormatError{ line: self.line, what: format!("unparseable field {}: {}", idx + 1, value) })
    }
}

fn check_count(
    expected: Option<usize>,
    got: usize,
    what: &str,
) -> Result<(), Mas5FormatError> {
    match expected {
        Some(n) if n != got => Err(Mas5FormatError{ line: 0, what: format!("{} {}, expected {}", got, what, n) }),
        _ => Ok(()),
    }
}

fn decode_results(
    assay_type: AssayType,
    has_comparison: bool,
    rows: &[Row],
    force: &[Row],
    orig: &[Row],
) -> Result<ChpResults, Mas5FormatError> {
    Ok(match assay_type {
        AssayType::Expression => {
            let mut entries: Vec<ExpressionResult> = Vec::with_capacity(rows.len());
            for row in rows {
                let comparison = if has_comparison {
                    Some(ComparisonResult {
                        change: row.field(5)?,
                        change_p_value: row.field(6)?,
                        signal_log_ratio: row.field(7)?,
                        signal_log_ratio_low: row.field(8)?,
                        signal_log_ratio_high: row.field(9)?,
                        n_common_pairs: row.field(10)?,
                    })
                } else {
                    None
                };
                entries.push(ExpressionResult {
                    detection: row.field(0)?,
                    detection_p_value: row.field(1)?,
                    signal: row.field(2)?,
                    n_pairs: row.field(3)?,
                    n_used_pairs: row.field(4)?,
                    comparison,
                });
            }
            ChpResults::Expression(entries)
        },
        AssayType::Genotyping => {
            let mut entries: Vec<GenotypeResult> = Vec::with_capacity(rows.len());
            for row in rows {
                entries.push(GenotypeResult {
                    allele_call: row.field(0)?,
                    confidence: row.field(1)?,
                    ras1: row.field(2)?,
                    ras2: row.field(3)?,
                    p_value_aa: row.field(4)?,
                    p_value_ab: row.field(5)?,
                    p_value_bb: row.field(6)?,
                    p_value_no_call: row.field(7)?,
                });
            }
            ChpResults::Genotyping(entries)
        },
        AssayType::Universal => {
            let mut entries: Vec<UniversalResult> = Vec::with_capacity(rows.len());
            for row in rows {
                entries.push(UniversalResult { background: row.field(0)? });
            }
            ChpResults::Universal(entries)
        },
        AssayType::Resequencing => {
            let mut reseq = ResequencingResults::default();
            for row in rows {
                reseq.calls.push(row.field(0)?);
                reseq.scores.push(row.field(1)?);
            }
            for row in force {
                reseq.force_calls.push(ForceCall { position: row.field(0)?, call: row.field(1)?, reason: row.field(2)? });
            }
            for row in orig {
                reseq.orig_calls.push(OrigCall { position: row.field(0)?, call: row.field(1)? });
            }
            ChpResults::Resequencing(reseq)
        },
    })
}

/// Parses a MAS5 CHP file.
///
/// Lines may end in `\n` or `\r\n`. Unknown header keys and sections are
/// skipped.
pub fn decode_mas5(
    bytes: &[u8],
) -> Result<ChpFile, E> {
    if !is_mas5(bytes) {
        return Err(Box::new(Mas5FormatError{ line: 1, what: format!("missing {} line", MAS5_MAGIC) }))
    }
    let contents = widen(bytes);
    let mut chp = ChpFile::default();
    let mut section = Section::None;
    let mut assay_type: Option<AssayType> = None;
    let mut has_comparison = false;

    let mut n_zones: Option<usize> = None;
    let mut n_entries: Option<usize> = None;
    let mut n_force: Option<usize> = None;
    let mut n_orig: Option<usize> = None;
    let mut zones: Vec<Row> = Vec::new();
    let mut results: Vec<Row> = Vec::new();
    let mut force: Vec<Row> = Vec::new();
    let mut orig: Vec<Row> = Vec::new();

    for (line_idx, raw_line) in contents.lines().enumerate().skip(1) {
        let line_nr = line_idx + 1;
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue
        }
        if let Some(next) = Section::from_line(line.trim()) {
            section = next;
            continue
        }

        match section {
            Section::Header => {
                if let Some((key, value)) = line.split_once('=') {
                    match key {
                        "AssayType" => {
                            assay_type = Some(AssayType::from_name(value)
                                .ok_or(Mas5FormatError{ line: line_nr, what: format!("unknown assay type {}", value) })?);
                        },
                        "Cols" => chp.cols = atoi(value).clamp(0, u16::MAX as i32) as u16,
                        "Rows" => chp.rows = atoi(value).clamp(0, u16::MAX as i32) as u16,
                        "ProgID" => chp.prog_id = value.to_string(),
                        "ParentCEL" => chp.parent_cel = value.to_string(),
                        "ChipType" => chp.chip_type = value.to_string(),
                        "Algorithm" => chp.algorithm_name = value.to_string(),
                        "AlgorithmVersion" => chp.algorithm_version = value.to_string(),
                        "HasComparison" => has_comparison = atoi(value) != 0,
                        "SmoothFactor" => chp.smooth_factor = value.trim().parse::<f32>()?,
                        _ => {},
                    }
                }
            },
            Section::Algorithm | Section::Summary => {
                if let Some((key, value)) = line.split_once('=') {
                    let params = if section == Section::Algorithm { &mut chp.algorithm_params } else { &mut chp.summary_params };
                    params.insert(key.to_string(), value.to_string());
                }
            },
            Section::Background | Section::Results | Section::Force | Section::Orig => {
                if let Some((key, value)) = line.split_once('=') {
                    let n = Some(atoi(value).max(0) as usize);
                    match key {
                        "NumberZones" => n_zones = n,
                        "NumberEntries" => n_entries = n,
                        "NumberCalls" if section == Section::Force => n_force = n,
                        "NumberCalls" => n_orig = n,
                        _ => {},
                    }
                    continue
                }
                let row = Row { line: line_nr, fields: line.split('\t').collect() };
                match section {
                    Section::Background => zones.push(row),
                    Section::Results => results.push(row),
                    Section::Force => force.push(row),
                    _ => orig.push(row),
                }
            },
            Section::None | Section::Other => {},
        }
    }

    let assay_type = assay_type.ok_or(Mas5FormatError{ line: 0, what: "missing AssayType".to_string() })?;
    check_count(n_zones, zones.len(), "background zones")?;
    check_count(n_entries, results.len(), "result entries")?;
    check_count(n_force, force.len(), "force calls")?;
    check_count(n_orig, orig.len(), "original calls")?;

    for row in zones.iter() {
        chp.zones.push(BackgroundZone { center_x: row.field(0)?, center_y: row.field(1)?, background: row.field(2)? });
    }
    chp.results = decode_results(assay_type, has_comparison, &results, &force, &orig)?;

    Ok(chp)
}

// Tests
#[cfg(test)]
mod tests {

    fn mock_expression() -> crate::chp::ChpFile {
        use crate::chp::{BackgroundZone, ChpFile, ChpResults, ExpressionResult};

        let mut chp = ChpFile::new(ChpResults::Expression(vec![
            ExpressionResult { detection: 0, detection_p_value: 0.002, signal: 1043.7, n_pairs: 16, n_used_pairs: 16, comparison: None },
            ExpressionResult { detection: 2, detection_p_value: 0.5, signal: 12.25, n_pairs: 11, n_used_pairs: 10, comparison: None },
        ]));
        chp.rows = 5;
        chp.cols = 5;
        chp.parent_cel = "test.CEL".to_string();
        chp.chip_type = "Test3".to_string();
        chp.algorithm_name = "ExpressionStat".to_string();
        chp.algorithm_version = "5.0".to_string();
        chp.algorithm_params.insert("Alpha1".to_string(), "0.04".to_string());
        chp.algorithm_params.insert("SFGene".to_string(), "All".to_string());
        chp.summary_params.insert("RawQ".to_string(), "1.23".to_string());
        chp.smooth_factor = 100.0;
        chp.zones.push(BackgroundZone { center_x: 1.0, center_y: 2.0, background: 30.5 });
        chp
    }

    #[test]
    fn encode_mas5_layout() {
        use super::encode_mas5;

        let text = encode_mas5(&mock_expression());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "GeneChip Sequence File");
        assert_eq!(lines[1], "[HEADER]");
        assert_eq!(lines[2], "AssayType=Expression");
        assert!(text.contains("[ALGORITHM]\nAlpha1=0.04\nSFGene=All\n"));
        assert!(text.contains("[BACKGROUND]\nNumberZones=1\n1\t2\t30.5\n"));
        assert!(text.ends_with("[RESULTS]\nNumberEntries=2\n0\t0.002\t1043.7\t16\t16\n2\t0.5\t12.25\t11\t10\n"));
    }

    #[test]
    fn decode_encoded_expression() {
        use super::{decode_mas5, encode_mas5};

        let chp = mock_expression();
        let text = encode_mas5(&chp).replace('\n', "\r\n");

        assert_eq!(decode_mas5(text.as_bytes()).unwrap(), chp);
    }

    #[test]
    fn decode_encoded_resequencing() {
        use super::{decode_mas5, encode_mas5};
        use crate::chp::{ChpFile, ChpResults, ForceCall, OrigCall, ResequencingResults};

        let chp = ChpFile::new(ChpResults::Resequencing(ResequencingResults {
            calls: b"ACG".to_vec(),
            scores: vec![0.25, 1.5, 9.0],
            force_calls: vec![ForceCall { position: 2, call: b'N', reason: 1 }],
            orig_calls: vec![OrigCall { position: 2, call: b'G' }],
        }));

        assert_eq!(decode_mas5(encode_mas5(&chp).as_bytes()).unwrap(), chp);
    }

    #[test]
    fn is_mas5_sniff() {
        use super::is_mas5;

        assert!(is_mas5(b"GeneChip Sequence File\r\n[HEADER]\r\n"));
        assert!(is_mas5(b"GeneChip Sequence File"));
        assert!(!is_mas5(b"[CEL]\nVersion=3\n"));
        assert!(!is_mas5(&[65, 0, 0, 0, 2, 0, 0, 0]));
    }

    #[test]
    fn entry_count_mismatch() {
        use super::decode_mas5;

        let text = "GeneChip Sequence File\n[HEADER]\nAssayType=Universal\n\n[RESULTS]\nNumberEntries=2\n1.5\n";

        assert!(decode_mas5(text.as_bytes()).is_err());
    }

    #[test]
    fn unparseable_field() {
        use super::decode_mas5;

        let text = "GeneChip Sequence File\n[HEADER]\nAssayType=Universal\n\n[RESULTS]\nNumberEntries=1\nlots\n";

        assert!(decode_mas5(text.as_bytes()).is_err());
    }

    #[test]
    fn missing_assay_type() {
        use super::decode_mas5;

        assert!(decode_mas5(b"GeneChip Sequence File\n[RESULTS]\n").is_err());
    }
}
