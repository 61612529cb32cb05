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

//! CHP files in the generic container format.
//!
//! The file type id names the assay (see
//! [AssayType::container_type_id]). Results are in the `Entry` data
//! set, one row per probe set, with a `ProbeSetName` column for the
//! expression and genotyping assays. Background zones are in the
//! `BackgroundZone` data set, and resequencing files add the `Force` and
//! `Orig` data sets. Each data set is the only one in a data group of the
//! same name.
//!
//! Algorithm and chip summary parameters are text parameters of the file
//! header with a name prefix.
//!
use std::io::Cursor;
use std::path::Path;

use bstr::BString;

use crate::cel::calvin::ALGORITHM_NAME_PARAM;
use crate::cel::calvin::ALGORITHM_PARAM_PREFIX;
use crate::cel::calvin::ARRAY_TYPE_PARAM;
use crate::cel::calvin::CEL_COLS_PARAM;
use crate::cel::calvin::CEL_ROWS_PARAM;
use crate::chp::AssayType;
use crate::chp::BackgroundZone;
use crate::chp::ChpResults;
use crate::chp::ComparisonResult;
use crate::chp::ExpressionResult;
use crate::chp::ForceCall;
use crate::chp::GenotypeResult;
use crate::chp::OrigCall;
use crate::chp::ResequencingResults;
use crate::chp::UniversalResult;
use crate::codec::narrow;
use crate::codec::read_file_bytes;
use crate::codec::widen;
use crate::generic::reader::read_generic;
use crate::generic::reader::container_file_type;
use crate::generic::writer::write_generic_file;
use crate::generic::ColumnData;
use crate::generic::DataGroup;
use crate::generic::DataSet;
use crate::generic::FormatError;
use crate::generic::GenericData;
use crate::generic::GenericDataHeader;
use crate::parameter::ParameterNameValue;

type E = Box<dyn std::error::Error>;

// File header parameters
pub const ALGORITHM_VERSION_PARAM: &str = "affymetrix-algorithm-version";
pub const PROG_ID_PARAM: &str = "affymetrix-progid";
pub const PARENT_CEL_PARAM: &str = "affymetrix-parent-celfile";
pub const CHIP_SUMMARY_PREFIX: &str = "affymetrix-chipsummary-";

// Data groups and data sets
pub const ENTRY_SET: &str = "Entry";
pub const ZONE_SET: &str = "BackgroundZone";
pub const FORCE_SET: &str = "Force";
pub const ORIG_SET: &str = "Orig";
pub const SMOOTH_FACTOR_PARAM: &str = "affymetrix-smooth-factor";

/// CHP file contents in container form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalvinChp {
    pub header: GenericDataHeader,
    /// One name per entry for expression and genotyping results.
    pub probe_set_names: Vec<String>,
    pub results: ChpResults,
    pub smooth_factor: f32,
    pub zones: Vec<BackgroundZone>,
}

impl CalvinChp {
    /// Creates an empty CHP for `assay_type` with a fresh file header.
    pub fn new(assay_type: AssayType) -> Self {
        let results = match assay_type {
            AssayType::Expression => ChpResults::Expression(Vec::new()),
            AssayType::Genotyping => ChpResults::Genotyping(Vec::new()),
            AssayType::Resequencing => ChpResults::Resequencing(ResequencingResults::default()),
            AssayType::Universal => ChpResults::Universal(Vec::new()),
        };
        CalvinChp { header: GenericDataHeader::new(assay_type.container_type_id()), results, ..Default::default() }
    }

    pub fn assay_type(&self) -> AssayType {
        self.results.assay_type()
    }

    fn text_param(&self, name: &str) -> String {
        self.header.find_param(name).and_then(|p| p.value_text()).unwrap_or_default().to_string()
    }

    pub fn algorithm_name(&self) -> String { self.text_param(ALGORITHM_NAME_PARAM) }
    pub fn algorithm_version(&self) -> String { self.text_param(ALGORITHM_VERSION_PARAM) }
    pub fn array_type(&self) -> String { self.text_param(ARRAY_TYPE_PARAM) }
    pub fn prog_id(&self) -> String { self.text_param(PROG_ID_PARAM) }
    pub fn parent_cel(&self) -> String { self.text_param(PARENT_CEL_PARAM) }

    pub fn set_algorithm_name(&mut self, value: &str) { self.header.add_param(ParameterNameValue::text(ALGORITHM_NAME_PARAM, value)) }
    pub fn set_algorithm_version(&mut self, value: &str) { self.header.add_param(ParameterNameValue::text(ALGORITHM_VERSION_PARAM, value)) }
    pub fn set_array_type(&mut self, value: &str) { self.header.add_param(ParameterNameValue::text(ARRAY_TYPE_PARAM, value)) }
    pub fn set_prog_id(&mut self, value: &str) { self.header.add_param(ParameterNameValue::text(PROG_ID_PARAM, value)) }
    pub fn set_parent_cel(&mut self, value: &str) { self.header.add_param(ParameterNameValue::text(PARENT_CEL_PARAM, value)) }

    pub fn rows(&self) -> i32 {
        self.header.find_param(CEL_ROWS_PARAM).and_then(|p| p.value_int32()).unwrap_or(0)
    }

    pub fn cols(&self) -> i32 {
        self.header.find_param(CEL_COLS_PARAM).and_then(|p| p.value_int32()).unwrap_or(0)
    }

    pub fn set_dimensions(
        &mut self,
        rows: i32,
        cols: i32,
    ) {
        self.header.add_param(ParameterNameValue::int32(CEL_ROWS_PARAM, rows));
        self.header.add_param(ParameterNameValue::int32(CEL_COLS_PARAM, cols));
    }

    fn prefixed_params(
        &self,
        prefix: &str,
    ) -> Vec<(String, String)> {
        self.header.params.iter().filter_map(|p| {
            p.name.strip_prefix(prefix).map(|name| (name.to_string(), p.value.to_string()))
        }).collect()
    }

    /// Algorithm parameters in file order as name and value strings.
    pub fn algorithm_params(&self) -> Vec<(String, String)> {
        self.prefixed_params(ALGORITHM_PARAM_PREFIX)
    }

    /// Chip summary parameters in file order as name and value strings.
    pub fn summary_params(&self) -> Vec<(String, String)> {
        self.prefixed_params(CHIP_SUMMARY_PREFIX)
    }

    pub fn add_algorithm_param(
        &mut self,
        name: &str,
        value: &str,
    ) {
        self.header.add_param(ParameterNameValue::text(&format!("{}{}", ALGORITHM_PARAM_PREFIX, name), value));
    }

    pub fn add_summary_param(
        &mut self,
        name: &str,
        value: &str,
    ) {
        self.header.add_param(ParameterNameValue::text(&format!("{}{}", CHIP_SUMMARY_PREFIX, name), value));
    }

    fn names_column(&self) -> Result<ColumnData, E> {
        if self.probe_set_names.len() != self.results.len() {
            return Err(Box::new(FormatError{ what: format!("{} probe set names for {} entries", self.probe_set_names.len(), self.results.len()) }))
        }
        Ok(ColumnData::Ascii(self.probe_set_names.iter().map(|x| narrow(x)).collect()))
    }

    fn entry_set(&self) -> Result<DataSet, E> {
        let mut set = DataSet::new(ENTRY_SET);
        match &self.results {
            ChpResults::Expression(entries) => {
                set.add_column("ProbeSetName", self.names_column()?);
                set.add_column("Detection", ColumnData::UInt8(entries.iter().map(|e| e.detection).collect()));
                set.add_column("DetectionPValue", ColumnData::Float(entries.iter().map(|e| e.detection_p_value).collect()));
                set.add_column("Signal", ColumnData::Float(entries.iter().map(|e| e.signal).collect()));
                set.add_column("NumPairs", ColumnData::UInt16(entries.iter().map(|e| e.n_pairs).collect()));
                set.add_column("NumPairsUsed", ColumnData::UInt16(entries.iter().map(|e| e.n_used_pairs).collect()));
                if self.results.has_comparison() {
                    let comp: Vec<ComparisonResult> = entries.iter().map(|e| e.comparison.clone().unwrap_or_default()).collect();
                    set.add_column("Change", ColumnData::UInt8(comp.iter().map(|c| c.change).collect()));
                    set.add_column("ChangePValue", ColumnData::Float(comp.iter().map(|c| c.change_p_value).collect()));
                    set.add_column("SigLogRatio", ColumnData::Float(comp.iter().map(|c| c.signal_log_ratio).collect()));
                    set.add_column("SigLogRatioLo", ColumnData::Float(comp.iter().map(|c| c.signal_log_ratio_low).collect()));
                    set.add_column("SigLogRatioHi", ColumnData::Float(comp.iter().map(|c| c.signal_log_ratio_high).collect()));
                    set.add_column("CommonPairs", ColumnData::UInt16(comp.iter().map(|c| c.n_common_pairs).collect()));
                }
            },
            ChpResults::Genotyping(entries) => {
                set.add_column("ProbeSetName", self.names_column()?);
                set.add_column("Call", ColumnData::UInt8(entries.iter().map(|e| e.allele_call).collect()));
                set.add_column("Confidence", ColumnData::Float(entries.iter().map(|e| e.confidence).collect()));
                set.add_column("RAS1", ColumnData::Float(entries.iter().map(|e| e.ras1).collect()));
                set.add_column("RAS2", ColumnData::Float(entries.iter().map(|e| e.ras2).collect()));
                set.add_column("AA", ColumnData::Float(entries.iter().map(|e| e.p_value_aa).collect()));
                set.add_column("AB", ColumnData::Float(entries.iter().map(|e| e.p_value_ab).collect()));
                set.add_column("BB", ColumnData::Float(entries.iter().map(|e| e.p_value_bb).collect()));
                set.add_column("NoCall", ColumnData::Float(entries.iter().map(|e| e.p_value_no_call).collect()));
            },
            ChpResults::Universal(entries) => {
                set.add_column("Background", ColumnData::Float(entries.iter().map(|e| e.background).collect()));
            },
            ChpResults::Resequencing(reseq) => {
                set.add_column("Call", ColumnData::UInt8(reseq.calls.clone()));
                set.add_column("Score", ColumnData::Float(reseq.scores.clone()));
            },
        }
        Ok(set)
    }

    /// Lays the contents out as container data groups.
    ///
    /// Fails if the number of probe set names does not match the number
    /// of expression or genotyping entries.
    pub fn to_generic(&self) -> Result<GenericData, E> {
        let mut header = self.header.clone();
        header.file_type_id = self.assay_type().container_type_id().to_string();
        let mut data = GenericData::new(header);

        let mut zones = DataSet::new(ZONE_SET);
        zones.add_param(ParameterNameValue::float(SMOOTH_FACTOR_PARAM, self.smooth_factor));
        zones.add_column("CenterX", ColumnData::Float(self.zones.iter().map(|z| z.center_x).collect()));
        zones.add_column("CenterY", ColumnData::Float(self.zones.iter().map(|z| z.center_y).collect()));
        zones.add_column("Background", ColumnData::Float(self.zones.iter().map(|z| z.background).collect()));

        let mut sets = vec![self.entry_set()?, zones];
        if let ChpResults::Resequencing(reseq) = &self.results {
            let mut force = DataSet::new(FORCE_SET);
            force.add_column("Position", ColumnData::Int32(reseq.force_calls.iter().map(|x| x.position).collect()));
            force.add_column("Call", ColumnData::UInt8(reseq.force_calls.iter().map(|x| x.call).collect()));
            force.add_column("Reason", ColumnData::UInt8(reseq.force_calls.iter().map(|x| x.reason).collect()));
            let mut orig = DataSet::new(ORIG_SET);
            orig.add_column("Position", ColumnData::Int32(reseq.orig_calls.iter().map(|x| x.position).collect()));
            orig.add_column("Call", ColumnData::UInt8(reseq.orig_calls.iter().map(|x| x.call).collect()));
            sets.push(force);
            sets.push(orig);
        }

        data.groups = sets.into_iter().map(|set| {
            let mut group = DataGroup::new(&set.name);
            group.data_sets.push(set);
            group
        }).collect();
        Ok(data)
    }

    /// Reads the contents back from container data groups.
    ///
    /// A missing background zone set means no zones. Resequencing files
    /// without force or original call sets have empty lists.
    pub fn from_generic(
        data: GenericData,
    ) -> Result<Self, E> {
        let assay_type = AssayType::from_container_type_id(&data.header.file_type_id)
            .ok_or(FormatError{ what: format!("file type {} is not a CHP file", data.header.file_type_id) })?;
        let entries = data.data_set(ENTRY_SET, ENTRY_SET)
            .ok_or(FormatError{ what: "no Entry data set".to_string() })?;
        let n = entries.n_rows();

        let mut chp = CalvinChp { header: data.header.clone(), ..Default::default() };
        chp.results = match assay_type {
            AssayType::Expression => {
                chp.probe_set_names = names(entries, n)?;
                let detection = uint8s(entries, "Detection", n)?;
                let detection_p_value = floats(entries, "DetectionPValue", n)?;
                let signal = floats(entries, "Signal", n)?;
                let n_pairs = uint16s(entries, "NumPairs", n)?;
                let n_used_pairs = uint16s(entries, "NumPairsUsed", n)?;
                let comparison = match entries.column("Change") {
                    Some(_) => Some((
                        uint8s(entries, "Change", n)?,
                        floats(entries, "ChangePValue", n)?,
                        floats(entries, "SigLogRatio", n)?,
                        floats(entries, "SigLogRatioLo", n)?,
                        floats(entries, "SigLogRatioHi", n)?,
                        uint16s(entries, "CommonPairs", n)?,
                    )),
                    None => None,
                };
                ChpResults::Expression((0..n).map(|i| ExpressionResult {
                    detection: detection[i],
                    detection_p_value: detection_p_value[i],
                    signal: signal[i],
                    n_pairs: n_pairs[i],
                    n_used_pairs: n_used_pairs[i],
                    comparison: comparison.as_ref().map(|c| ComparisonResult {
                        change: c.0[i],
                        change_p_value: c.1[i],
                        signal_log_ratio: c.2[i],
                        signal_log_ratio_low: c.3[i],
                        signal_log_ratio_high: c.4[i],
                        n_common_pairs: c.5[i],
                    }),
                }).collect())
            },
            AssayType::Genotyping => {
                chp.probe_set_names = names(entries, n)?;
                let call = uint8s(entries, "Call", n)?;
                let confidence = floats(entries, "Confidence", n)?;
                let ras1 = floats(entries, "RAS1", n)?;
                let ras2 = floats(entries, "RAS2", n)?;
                let aa = floats(entries, "AA", n)?;
                let ab = floats(entries, "AB", n)?;
                let bb = floats(entries, "BB", n)?;
                let no_call = floats(entries, "NoCall", n)?;
                ChpResults::Genotyping((0..n).map(|i| GenotypeResult {
                    allele_call: call[i],
                    confidence: confidence[i],
                    ras1: ras1[i],
                    ras2: ras2[i],
                    p_value_aa: aa[i],
                    p_value_ab: ab[i],
                    p_value_bb: bb[i],
                    p_value_no_call: no_call[i],
                }).collect())
            },
            AssayType::Universal => {
                let background = floats(entries, "Background", n)?;
                ChpResults::Universal(background.iter().map(|x| UniversalResult { background: *x }).collect())
            },
            AssayType::Resequencing => {
                let mut reseq = ResequencingResults {
                    calls: uint8s(entries, "Call", n)?.to_vec(),
                    scores: floats(entries, "Score", n)?.to_vec(),
                    ..Default::default()
                };
                if let Some(force) = data.data_set(FORCE_SET, FORCE_SET) {
                    let n_force = force.n_rows();
                    let position = int32s(force, "Position", n_force)?;
                    let call = uint8s(force, "Call", n_force)?;
                    let reason = uint8s(force, "Reason", n_force)?;
                    reseq.force_calls = (0..n_force).map(|i| ForceCall { position: position[i], call: call[i], reason: reason[i] }).collect();
                }
                if let Some(orig) = data.data_set(ORIG_SET, ORIG_SET) {
                    let n_orig = orig.n_rows();
                    let position = int32s(orig, "Position", n_orig)?;
                    let call = uint8s(orig, "Call", n_orig)?;
                    reseq.orig_calls = (0..n_orig).map(|i| OrigCall { position: position[i], call: call[i] }).collect();
                }
                ChpResults::Resequencing(reseq)
            },
        };

        if let Some(zones) = data.data_set(ZONE_SET, ZONE_SET) {
            let n_zones = zones.n_rows();
            let center_x = floats(zones, "CenterX", n_zones)?;
            let center_y = floats(zones, "CenterY", n_zones)?;
            let background = floats(zones, "Background", n_zones)?;
            chp.zones = (0..n_zones).map(|i| BackgroundZone { center_x: center_x[i], center_y: center_y[i], background: background[i] }).collect();
            chp.smooth_factor = crate::parameter::find_param(&zones.params, SMOOTH_FACTOR_PARAM)
                .and_then(|p| p.value_float())
                .unwrap_or(0.0);
        }

        Ok(chp)
    }
}

fn column<'a>(
    set: &'a DataSet,
    name: &str,
    n: usize,
) -> Result<&'a ColumnData, FormatError> {
    let data = set.column(name)
        .ok_or(FormatError{ what: format!("no {} column in data set {}", name, set.name) })?;
    if data.len() != n {
        return Err(FormatError{ what: format!("column {} in data set {} has {} rows, expected {}", name, set.name, data.len(), n) })
    }
    Ok(data)
}

fn wrong_type(
    set: &DataSet,
    name: &str,
) -> FormatError {
    FormatError{ what: format!("column {} in data set {} has the wrong type", name, set.name) }
}

fn floats<'a>(set: &'a DataSet, name: &str, n: usize) -> Result<&'a [f32], FormatError> {
    match column(set, name, n)? { ColumnData::Float(x) => Ok(x), _ => Err(wrong_type(set, name)) }
}

fn uint8s<'a>(set: &'a DataSet, name: &str, n: usize) -> Result<&'a [u8], FormatError> {
    match column(set, name, n)? { ColumnData::UInt8(x) => Ok(x), _ => Err(wrong_type(set, name)) }
}

fn uint16s<'a>(set: &'a DataSet, name: &str, n: usize) -> Result<&'a [u16], FormatError> {
    match column(set, name, n)? { ColumnData::UInt16(x) => Ok(x), _ => Err(wrong_type(set, name)) }
}

fn int32s<'a>(set: &'a DataSet, name: &str, n: usize) -> Result<&'a [i32], FormatError> {
    match column(set, name, n)? { ColumnData::Int32(x) => Ok(x), _ => Err(wrong_type(set, name)) }
}

fn names(
    set: &DataSet,
    n: usize,
) -> Result<Vec<String>, FormatError> {
    match column(set, "ProbeSetName", n)? {
        ColumnData::Ascii(x) => Ok(x.iter().map(|s: &BString| widen(s)).collect()),
        _ => Err(wrong_type(set, "ProbeSetName")),
    }
}

/// Checks whether `bytes` starts with the header of a container CHP file.
pub fn is_calvin_chp(
    bytes: &[u8],
) -> bool {
    container_file_type(bytes).is_some_and(|x| AssayType::from_container_type_id(&x).is_some())
}

/// Reads the container CHP file at `path`.
pub fn read_calvin_chp(
    path: &Path,
) -> Result<CalvinChp, E> {
    let bytes = read_file_bytes(path)?;
    let data = read_generic(&mut Cursor::new(bytes))?;
    CalvinChp::from_generic(data)
}

/// Writes `chp` to `path` as a container file.
pub fn write_calvin_chp(
    chp: &CalvinChp,
    path: &Path,
) -> Result<(), E> {
    write_generic_file(&chp.to_generic()?, path)?;
    Ok(())
}
