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

//! Binary (GCOS) CHP files.
//!
//! ```text
//! i32 magic=65, i32 version=2, u16 cols, u16 rows, i32 n_entries,
//! i32 assay_type, u8 has_comparison,
//! ascii prog_id, ascii parent_cel, ascii chip_type, ascii alg_name, ascii alg_version,
//! i32 n, (ascii tag, ascii value)* alg params, i32 n, (ascii tag, ascii value)* summary,
//! i32 n_zones, f32 smooth, (f32 cx, f32 cy, f32 bg)*,
//! entries
//! ```
//!
//! Entries depend on the assay type:
//!   - Expression: u8 detection, f32 p-value, f32 signal, u16 pairs,
//!     u16 used pairs, and if has_comparison u8 change, f32 p-value,
//!     f32 log ratio, f32 low, f32 high, u16 common pairs.
//!   - Genotyping: u8 call, f32 confidence, f32 ras1, f32 ras2 and four
//!     f32 p-values.
//!   - Universal: f32 background.
//!   - Resequencing: n_entries * (u8 call, f32 score), then
//!     i32 n, (i32 position, u8 call, u8 reason)* force calls and
//!     i32 n, (i32 position, u8 call)* original calls.
//!
use std::io::Cursor;
use std::io::Write;

use bincode::{Encode, Decode};
use bincode::decode_from_std_read;
use bincode::encode_into_std_write;

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
use crate::codec::legacy_config;
use crate::codec::AsciiString;
use crate::codec::narrow;
use crate::codec::widen;

type E = Box<dyn std::error::Error>;

pub const CHP_XDA_MAGIC: i32 = 65;
pub const CHP_XDA_VERSION: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ChpXdaPreamble {
    pub magic: i32,
    pub version: i32,
    pub cols: u16,
    pub rows: u16,
    pub n_entries: i32,
    pub assay_type: i32,
    pub has_comparison: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ChpXdaHeader {
    pub prog_id: AsciiString,
    pub parent_cel: AsciiString,
    pub chip_type: AsciiString,
    pub algorithm_name: AsciiString,
    pub algorithm_version: AsciiString,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
struct TagValue {
    tag: AsciiString,
    value: AsciiString,
}

/// Expression entry without the comparison fields.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
struct ExpressionEntry {
    detection: u8,
    detection_p_value: f32,
    signal: f32,
    n_pairs: u16,
    n_used_pairs: u16,
}

/// Malformed GCOS CHP file.
#[derive(Debug, Clone)]
pub struct ChpXdaFormatError {
    pub what: String,
}

impl std::fmt::Display for ChpXdaFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid GCOS CHP file: {}", self.what)
    }
}

impl std::error::Error for ChpXdaFormatError {}

/// Checks the magic number and version at the start of `bytes`.
pub fn is_chp_xda(
    bytes: &[u8],
) -> bool {
    match bincode::decode_from_slice::<ChpXdaPreamble, _>(bytes, legacy_config()) {
        Ok((preamble, _)) => preamble.magic == CHP_XDA_MAGIC && preamble.version == CHP_XDA_VERSION,
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

fn decode_count(
    conn: &mut Cursor<&[u8]>,
    what: &str,
) -> Result<usize, E> {
    let n: i32 = decode_from_std_read(conn, legacy_config())?;
    if n < 0 {
        return Err(Box::new(ChpXdaFormatError{ what: format!("negative {} count {}", what, n) }))
    }
    Ok(n as usize)
}

fn encode_tag_values<W: Write>(
    params: &IndexMap<String, String>,
    conn: &mut W,
) -> Result<(), E> {
    encode_item(&(params.len() as i32), conn)?;
    for (tag, value) in params {
        let item = TagValue { tag: AsciiString(narrow(tag)), value: AsciiString(narrow(value)) };
        encode_item(&item, conn)?;
    }
    Ok(())
}

fn decode_tag_values(
    conn: &mut Cursor<&[u8]>,
) -> Result<IndexMap<String, String>, E> {
    let n = decode_count(conn, "parameter")?;
    let mut params: IndexMap<String, String> = IndexMap::new();
    for _ in 0..n {
        let item: TagValue = decode_from_std_read(conn, legacy_config())?;
        params.insert(widen(&item.tag.0), widen(&item.value.0));
    }
    Ok(params)
}

/// Encodes `chp` as a GCOS CHP file.
///
/// Expression entries carry comparison fields if the first entry has
/// them; entries without them are written with zeroed fields.
pub fn encode_chp_xda(
    chp: &ChpFile,
) -> Result<Vec<u8>, E> {
    let mut bytes: Vec<u8> = Vec::new();
    let has_comparison = chp.results.has_comparison();
    let preamble = ChpXdaPreamble {
        magic: CHP_XDA_MAGIC,
        version: CHP_XDA_VERSION,
        cols: chp.cols,
        rows: chp.rows,
        n_entries: chp.n_entries() as i32,
        assay_type: chp.assay_type().to_i32(),
        has_comparison: has_comparison as u8,
    };
    encode_item(&preamble, &mut bytes)?;

    let header = ChpXdaHeader {
        prog_id: AsciiString(narrow(&chp.prog_id)),
        parent_cel: AsciiString(narrow(&chp.parent_cel)),
        chip_type: AsciiString(narrow(&chp.chip_type)),
        algorithm_name: AsciiString(narrow(&chp.algorithm_name)),
        algorithm_version: AsciiString(narrow(&chp.algorithm_version)),
    };
    encode_item(&header, &mut bytes)?;
    encode_tag_values(&chp.algorithm_params, &mut bytes)?;
    encode_tag_values(&chp.summary_params, &mut bytes)?;

    encode_item(&(chp.zones.len() as i32), &mut bytes)?;
    encode_item(&chp.smooth_factor, &mut bytes)?;
    for zone in chp.zones.iter() {
        encode_item(zone, &mut bytes)?;
    }

    match &chp.results {
        ChpResults::Expression(entries) => {
            for entry in entries {
                let base = ExpressionEntry {
                    detection: entry.detection,
                    detection_p_value: entry.detection_p_value,
                    signal: entry.signal,
                    n_pairs: entry.n_pairs,
                    n_used_pairs: entry.n_used_pairs,
                };
                encode_item(&base, &mut bytes)?;
                if has_comparison {
                    encode_item(&entry.comparison.clone().unwrap_or_default(), &mut bytes)?;
                }
            }
        },
        ChpResults::Genotyping(entries) => {
            for entry in entries {
                encode_item(entry, &mut bytes)?;
            }
        },
        ChpResults::Universal(entries) => {
            for entry in entries {
                encode_item(entry, &mut bytes)?;
            }
        },
        ChpResults::Resequencing(reseq) => {
            if reseq.calls.len() != reseq.scores.len() {
                return Err(Box::new(ChpXdaFormatError{ what: format!("{} calls with {} scores", reseq.calls.len(), reseq.scores.len()) }))
            }
            for (call, score) in reseq.calls.iter().zip(reseq.scores.iter()) {
                encode_item(&(*call, *score), &mut bytes)?;
            }
            encode_item(&(reseq.force_calls.len() as i32), &mut bytes)?;
            for force in reseq.force_calls.iter() {
                encode_item(force, &mut bytes)?;
            }
            encode_item(&(reseq.orig_calls.len() as i32), &mut bytes)?;
            for orig in reseq.orig_calls.iter() {
                encode_item(orig, &mut bytes)?;
            }
        },
    }

    Ok(bytes)
}

fn decode_entries<T: Decode<()>>(
    conn: &mut Cursor<&[u8]>,
    n: usize,
) -> Result<Vec<T>, E> {
    let mut entries: Vec<T> = Vec::new();
    for _ in 0..n {
        entries.push(decode_from_std_read(conn, legacy_config())?);
    }
    Ok(entries)
}

/// Decodes a GCOS CHP file.
pub fn decode_chp_xda(
    bytes: &[u8],
) -> Result<ChpFile, E> {
    let mut conn = Cursor::new(bytes);
    let preamble: ChpXdaPreamble = decode_from_std_read(&mut conn, legacy_config())?;
    if preamble.magic != CHP_XDA_MAGIC || preamble.version != CHP_XDA_VERSION {
        return Err(Box::new(ChpXdaFormatError{ what: format!("magic {} version {}", preamble.magic, preamble.version) }))
    }
    if preamble.n_entries < 0 {
        return Err(Box::new(ChpXdaFormatError{ what: format!("{} entries", preamble.n_entries) }))
    }
    let assay_type = AssayType::from_i32(preamble.assay_type)
        .ok_or(ChpXdaFormatError{ what: format!("assay type {}", preamble.assay_type) })?;
    let n_entries = preamble.n_entries as usize;

    let header: ChpXdaHeader = decode_from_std_read(&mut conn, legacy_config())?;
    let algorithm_params = decode_tag_values(&mut conn)?;
    let summary_params = decode_tag_values(&mut conn)?;

    let n_zones = decode_count(&mut conn, "zone")?;
    let smooth_factor: f32 = decode_from_std_read(&mut conn, legacy_config())?;
    let zones: Vec<BackgroundZone> = decode_entries(&mut conn, n_zones)?;

    let results = match assay_type {
        AssayType::Expression => {
            let mut entries: Vec<ExpressionResult> = Vec::new();
            for _ in 0..n_entries {
                let base: ExpressionEntry = decode_from_std_read(&mut conn, legacy_config())?;
                let comparison: Option<ComparisonResult> = if preamble.has_comparison != 0 {
                    Some(decode_from_std_read(&mut conn, legacy_config())?)
                } else {
                    None
                };
                entries.push(ExpressionResult {
                    detection: base.detection,
                    detection_p_value: base.detection_p_value,
                    signal: base.signal,
                    n_pairs: base.n_pairs,
                    n_used_pairs: base.n_used_pairs,
                    comparison,
                });
            }
            ChpResults::Expression(entries)
        },
        AssayType::Genotyping => ChpResults::Genotyping(decode_entries::<GenotypeResult>(&mut conn, n_entries)?),
        AssayType::Universal => ChpResults::Universal(decode_entries::<UniversalResult>(&mut conn, n_entries)?),
        AssayType::Resequencing => {
            let bases: Vec<(u8, f32)> = decode_entries(&mut conn, n_entries)?;
            let n_force = decode_count(&mut conn, "force call")?;
            let force_calls: Vec<ForceCall> = decode_entries(&mut conn, n_force)?;
            let n_orig = decode_count(&mut conn, "original call")?;
            let orig_calls: Vec<OrigCall> = decode_entries(&mut conn, n_orig)?;
            ChpResults::Resequencing(ResequencingResults {
                calls: bases.iter().map(|x| x.0).collect(),
                scores: bases.iter().map(|x| x.1).collect(),
                force_calls,
                orig_calls,
            })
        },
    };

    Ok(ChpFile {
        rows: preamble.rows,
        cols: preamble.cols,
        prog_id: widen(&header.prog_id.0),
        parent_cel: widen(&header.parent_cel.0),
        chip_type: widen(&header.chip_type.0),
        algorithm_name: widen(&header.algorithm_name.0),
        algorithm_version: widen(&header.algorithm_version.0),
        algorithm_params,
        summary_params,
        smooth_factor,
        zones,
        results,
    })
}
