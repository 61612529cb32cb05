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

//! Field-by-field copies between the CHP models.
//!
//! Only the container form stores probe set names, so copying a legacy
//! CHP into it needs the library files of the chip type (see
//! [load_probe_set_names]). Genotyping results and results of the
//! `ExpressionCall` algorithm are not copied into the container form.
//!
use std::path::Path;

use crate::cel::calvin::read_calvin_cel;
use crate::cel::read_legacy_cel;
use crate::chp::calvin::CalvinChp;
use crate::chp::library::decode_cdf_names;
use crate::chp::library::load_probe_set_names;
use crate::chp::AssayType;
use crate::chp::ChpFile;
use crate::chp::ChpResults;
use crate::chp::LegacyChpFormat;
use crate::codec::read_file_bytes;
use crate::converter::config::ConverterConfig;
use crate::converter::options::ChpConversionOptions;
use crate::converter::ConversionError;
use crate::generic::reader::read_generic_file_header;
use crate::generic::GenericDataHeader;

/// Algorithm whose results cannot be copied into the container form.
pub const EXPRESSION_CALL_ALGORITHM: &str = "ExpressionCall";

/// Background zone parameters added ahead of the algorithm parameters of
/// a MAS5 CHP copied into the container form.
pub const ZONE_PARAMS: [(&str, &str); 3] = [
    ("HZ", "4"),
    ("VZ", "4"),
    ("BG", "2"),
];

/// File name part of `path`.
///
/// A `\` separator is looked for first, then `/`.
pub fn parent_cel_name(
    path: &str,
) -> &str {
    match path.rfind('\\').or_else(|| path.rfind('/')) {
        Some(pos) => &path[(pos + 1)..],
        None => path,
    }
}

/// Genotyping results cannot be copied into the container form.
pub fn check_assay_type(
    chp: &ChpFile,
) -> Result<(), ConversionError> {
    match chp.assay_type() {
        AssayType::Genotyping => Err(ConversionError::InvalidAssayType),
        _ => Ok(()),
    }
}

/// Results of the `ExpressionCall` algorithm, in any case, cannot be
/// copied into the container form.
pub fn check_algorithm_type(
    algorithm_name: &str,
) -> Result<(), ConversionError> {
    if algorithm_name.eq_ignore_ascii_case(EXPRESSION_CALL_ALGORITHM) {
        Err(ConversionError::InvalidAlgorithmType)
    } else {
        Ok(())
    }
}

fn chip_type_or(
    options: Option<&ChpConversionOptions>,
    input: &str,
) -> String {
    options.map(|opts| opts.chip_type_or(input)).unwrap_or(input).to_string()
}

/// Algorithm name stored in a legacy CHP.
///
/// Genotyping names get the assay name as a prefix, as legacy readers
/// expect. Names of the other assays are stored as is.
pub fn legacy_algorithm_name(
    assay_type: AssayType,
    name: &str,
) -> String {
    match assay_type {
        AssayType::Genotyping => format!("{}{}", assay_type.name(), name),
        _ => name.to_string(),
    }
}

/// Copies a container CHP into the legacy model.
///
/// The probe set names are dropped. The algorithm name goes through
/// [legacy_algorithm_name].
pub fn calvin_to_legacy(
    input: &CalvinChp,
    options: Option<&ChpConversionOptions>,
) -> ChpFile {
    let mut chp = ChpFile::new(input.results.clone());
    chp.rows = input.rows().clamp(0, u16::MAX as i32) as u16;
    chp.cols = input.cols().clamp(0, u16::MAX as i32) as u16;
    chp.prog_id = input.prog_id();
    chp.parent_cel = input.parent_cel();
    chp.chip_type = chip_type_or(options, &input.array_type());
    chp.algorithm_name = legacy_algorithm_name(input.assay_type(), &input.algorithm_name());
    chp.algorithm_version = input.algorithm_version();
    chp.algorithm_params = input.algorithm_params().into_iter().collect();
    chp.summary_params = input.summary_params().into_iter().collect();
    chp.smooth_factor = input.smooth_factor;
    chp.zones = input.zones.clone();
    chp
}

/// Copies a legacy CHP into another legacy layout.
pub fn legacy_to_legacy(
    input: &ChpFile,
    options: Option<&ChpConversionOptions>,
) -> ChpFile {
    let mut chp = input.clone();
    chp.chip_type = chip_type_or(options, &input.chip_type);
    chp
}

/// Parent header of a converted CHP.
///
/// The header of the configured parent CEL if it is a container file,
/// else an array header with the configured array id and barcode.
fn parent_header(
    config: &ConverterConfig,
) -> Option<GenericDataHeader> {
    let from_cel = config.parent_cel.as_deref().and_then(|path| {
        match read_generic_file_header(path) {
            Ok(header) => Some(header),
            Err(e) => {
                log::debug!("No container header in parent CEL {}: {}", path.display(), e);
                None
            },
        }
    });
    from_cel.or_else(|| config.array_header())
}

fn can_read_cel(
    path: &Path,
) -> bool {
    let readable = read_legacy_cel(path).map(|_| ()).or_else(|_| read_calvin_cel(path).map(|_| ()));
    if let Err(e) = &readable {
        log::warn!("Unable to read parent CEL {}: {}", path.display(), e);
    }
    readable.is_ok()
}

fn can_read_cdf(
    path: &Path,
) -> bool {
    match read_file_bytes(path).and_then(|bytes| decode_cdf_names(&bytes)) {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Unable to read CDF file {}: {}", path.display(), e);
            false
        },
    }
}

fn set_header(
    chp: &mut CalvinChp,
    input: &ChpFile,
    chip_type: &str,
    inserted_params: &[(&str, &str)],
) {
    chp.set_algorithm_name(&input.algorithm_name);
    chp.set_algorithm_version(&input.algorithm_version);
    chp.set_array_type(chip_type);
    chp.set_dimensions(input.rows as i32, input.cols as i32);
    chp.set_parent_cel(&input.parent_cel);
    chp.set_prog_id(&input.prog_id);
    inserted_params.iter().for_each(|(tag, value)| chp.add_algorithm_param(tag, value));
    input.algorithm_params.iter().for_each(|(tag, value)| chp.add_algorithm_param(tag, value));
    input.summary_params.iter().for_each(|(tag, value)| chp.add_summary_param(tag, value));
}

/// Copies a legacy CHP read from `format` into the container form.
///
/// Extra parameters from `config` override the copied header parameters
/// of a GCOS input. For a MAS5 input they are added first, the
/// [ZONE_PARAMS] are inserted, and expression results also need a
/// readable parent CEL file and `<library>/<chip_type>.CDF`. Background
/// zones of a MAS5 input are only kept for expression results.
pub fn legacy_to_calvin(
    input: &ChpFile,
    format: LegacyChpFormat,
    options: Option<&ChpConversionOptions>,
    config: &ConverterConfig,
) -> Result<CalvinChp, ConversionError> {
    check_assay_type(input)?;
    check_algorithm_type(&input.algorithm_name)?;

    let assay_type = input.assay_type();
    let chip_type = chip_type_or(options, &input.chip_type);
    let mut chp = CalvinChp::new(assay_type);

    match format {
        LegacyChpFormat::Mas5 => {
            config.extra_parameters.iter().for_each(|p| chp.header.add_param(p.clone()));
            set_header(&mut chp, input, &chip_type, &ZONE_PARAMS);
        },
        _ => {
            set_header(&mut chp, input, &chip_type, &[]);
        },
    }
    if let Some(parent_cel) = config.parent_cel.as_deref() {
        let path = parent_cel.to_string_lossy();
        chp.set_parent_cel(parent_cel_name(&path));
    }
    if format != LegacyChpFormat::Mas5 {
        config.extra_parameters.iter().for_each(|p| chp.header.add_param(p.clone()));
    }
    if let Some(parent) = parent_header(config) {
        chp.header.add_parent(parent);
    }

    let names = load_probe_set_names(&config.library_path, &input.chip_type, assay_type)
        .ok_or(ConversionError::UnableToLoadProbeSetNames)?;

    let keep_zones = match format {
        LegacyChpFormat::Mas5 => {
            if assay_type == AssayType::Expression {
                let parent_ok = config.parent_cel.as_deref().is_some_and(can_read_cel);
                if !parent_ok {
                    return Err(ConversionError::UnableToOpenParentCelFile)
                }
                if !can_read_cdf(&config.library_file(&input.chip_type, "CDF")) {
                    return Err(ConversionError::UnableToReadCdfFile)
                }
            }
            assay_type == AssayType::Expression
        },
        _ => true,
    };
    if keep_zones {
        chp.zones = input.zones.clone();
        chp.smooth_factor = input.smooth_factor;
    }

    if matches!(input.results, ChpResults::Expression(_) | ChpResults::Genotyping(_)) {
        let n = input.n_entries();
        if names.len() < n {
            log::warn!("{} probe set names for {} entries", names.len(), n);
            return Err(ConversionError::UnableToLoadProbeSetNames)
        }
        chp.probe_set_names = names.into_iter().take(n).collect();
    }
    chp.results = input.results.clone();

    Ok(chp)
}

// Tests
#[cfg(test)]
mod tests {

    const CDF: &str = "[CDF]\nVersion=GC3.0\n\n[Unit1000_Block1]\nName=AFFX-BioB-5_at\n\n[Unit1001_Block1]\nName=AFFX-BioB-M_at\n";

    fn mock_expression() -> crate::chp::ChpFile {
        use crate::chp::{BackgroundZone, ChpFile, ChpResults, ExpressionResult};

        let mut chp = ChpFile::new(ChpResults::Expression(vec![
            ExpressionResult { detection: 0, detection_p_value: 0.01, signal: 250.0, n_pairs: 16, n_used_pairs: 16, comparison: None },
            ExpressionResult { detection: 2, detection_p_value: 0.7, signal: 4.0, n_pairs: 16, n_used_pairs: 14, comparison: None },
        ]));
        chp.rows = 5;
        chp.cols = 5;
        chp.prog_id = "GeneChip.CallGEBaseCall.1".to_string();
        chp.parent_cel = "C:\\data\\test.CEL".to_string();
        chp.chip_type = "Test3".to_string();
        chp.algorithm_name = "ExpressionStat".to_string();
        chp.algorithm_version = "5.0".to_string();
        chp.algorithm_params.insert("Alpha1".to_string(), "0.04".to_string());
        chp.summary_params.insert("RawQ".to_string(), "1.23".to_string());
        chp.smooth_factor = 100.0;
        chp.zones.push(BackgroundZone { center_x: 1.0, center_y: 2.0, background: 30.5 });
        chp
    }

    fn library_config(
        dir: &std::path::Path,
    ) -> crate::converter::config::ConverterConfig {
        use crate::converter::config::ConverterConfig;

        std::fs::write(dir.join("Test3.CDF"), CDF).unwrap();
        ConverterConfig { library_path: dir.to_path_buf(), ..Default::default() }
    }

    #[test]
    fn parent_cel_name_strips_directories() {
        use super::parent_cel_name;

        assert_eq!(parent_cel_name("C:\\data\\a.CEL"), "a.CEL");
        assert_eq!(parent_cel_name("/data/b.CEL"), "b.CEL");
        assert_eq!(parent_cel_name("c.CEL"), "c.CEL");
    }

    #[test]
    fn rejected_inputs() {
        use super::{check_algorithm_type, check_assay_type};
        use crate::chp::{ChpFile, ChpResults};
        use crate::converter::ConversionError;

        assert_eq!(check_algorithm_type("expressioncall"), Err(ConversionError::InvalidAlgorithmType));
        assert_eq!(check_algorithm_type("ExpressionStat"), Ok(()));

        let genotyping = ChpFile::new(ChpResults::Genotyping(Vec::new()));
        assert_eq!(check_assay_type(&genotyping), Err(ConversionError::InvalidAssayType));
    }

    #[test]
    fn gcos_to_calvin_and_back() {
        use super::{calvin_to_legacy, legacy_to_calvin};
        use crate::chp::LegacyChpFormat;

        let dir = tempfile::tempdir().unwrap();
        let config = library_config(dir.path());
        let chp = mock_expression();

        let calvin = legacy_to_calvin(&chp, LegacyChpFormat::Gcos, None, &config).unwrap();
        assert_eq!(calvin.probe_set_names, vec!["AFFX-BioB-5_at", "AFFX-BioB-M_at"]);
        assert_eq!(calvin.array_type(), "Test3");
        assert_eq!(calvin.zones.len(), 1);
        assert!(calvin.header.parents.is_empty());

        let got = calvin_to_legacy(&calvin, None);
        assert_eq!(got, chp);
    }

    #[test]
    fn parent_cel_path_is_stripped() {
        use super::legacy_to_calvin;
        use crate::chp::LegacyChpFormat;
        use std::path::PathBuf;

        let dir = tempfile::tempdir().unwrap();
        let mut config = library_config(dir.path());
        config.parent_cel = Some(PathBuf::from("/nonexistent/parent.CEL"));
        config.array_id = Some("A1".to_string());

        let calvin = legacy_to_calvin(&mock_expression(), LegacyChpFormat::Gcos, None, &config).unwrap();

        assert_eq!(calvin.parent_cel(), "parent.CEL");
        // unreadable parent CEL falls back to the array header
        assert_eq!(calvin.header.parents.len(), 1);
        assert_eq!(calvin.header.parents[0].file_type_id, "affymetrix-calvin-array");
    }

    #[test]
    fn no_probe_set_names() {
        use super::legacy_to_calvin;
        use crate::chp::LegacyChpFormat;
        use crate::converter::config::ConverterConfig;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig { library_path: dir.path().to_path_buf(), ..Default::default() };

        let got = legacy_to_calvin(&mock_expression(), LegacyChpFormat::Gcos, None, &config);

        assert_eq!(got.err(), Some(ConversionError::UnableToLoadProbeSetNames));
    }

    #[test]
    fn mas5_needs_parent_cel() {
        use super::legacy_to_calvin;
        use crate::cel::{write_legacy_cel, CelFile, LegacyCelFormat};
        use crate::chp::LegacyChpFormat;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let mut config = library_config(dir.path());
        let chp = mock_expression();

        let got = legacy_to_calvin(&chp, LegacyChpFormat::Mas5, None, &config);
        assert_eq!(got.err(), Some(ConversionError::UnableToOpenParentCelFile));

        let cel_path = dir.path().join("parent.CEL");
        write_legacy_cel(&CelFile::new(5, 5), &cel_path, LegacyCelFormat::Xda).unwrap();
        config.parent_cel = Some(cel_path);

        let calvin = legacy_to_calvin(&chp, LegacyChpFormat::Mas5, None, &config).unwrap();
        let names: Vec<String> = calvin.algorithm_params().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["HZ", "VZ", "BG", "Alpha1"]);
        assert_eq!(calvin.parent_cel(), "parent.CEL");
        assert_eq!(calvin.zones.len(), 1);
    }

    #[test]
    fn mas5_needs_cdf() {
        use super::legacy_to_calvin;
        use crate::cel::{write_legacy_cel, CelFile, LegacyCelFormat};
        use crate::chp::LegacyChpFormat;
        use crate::converter::config::ConverterConfig;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let cel_path = dir.path().join("parent.CEL");
        write_legacy_cel(&CelFile::new(5, 5), &cel_path, LegacyCelFormat::Xda).unwrap();
        std::fs::write(dir.path().join("Test3.PSI"), "#Probe Sets=2\n0\ta\t16\n1\tb\t16\n").unwrap();
        let config = ConverterConfig { library_path: dir.path().to_path_buf(), parent_cel: Some(cel_path), ..Default::default() };

        let got = legacy_to_calvin(&mock_expression(), LegacyChpFormat::Mas5, None, &config);

        assert_eq!(got.err(), Some(ConversionError::UnableToReadCdfFile));
    }

    #[test]
    fn mas5_universal_has_no_zones() {
        use super::legacy_to_calvin;
        use crate::chp::{BackgroundZone, ChpFile, ChpResults, LegacyChpFormat, UniversalResult};

        let dir = tempfile::tempdir().unwrap();
        let config = library_config(dir.path());
        let mut chp = ChpFile::new(ChpResults::Universal(vec![UniversalResult { background: 1.0 }]));
        chp.chip_type = "Test3".to_string();
        chp.zones.push(BackgroundZone::default());

        let calvin = legacy_to_calvin(&chp, LegacyChpFormat::Mas5, None, &config).unwrap();

        assert!(calvin.zones.is_empty());
        assert!(calvin.probe_set_names.is_empty());
    }

    #[test]
    fn genotyping_algorithm_name_is_prefixed() {
        use super::calvin_to_legacy;
        use crate::chp::calvin::CalvinChp;
        use crate::chp::{AssayType, ChpResults, GenotypeResult};

        let mut calvin = CalvinChp::new(AssayType::Genotyping);
        calvin.results = ChpResults::Genotyping(vec![GenotypeResult { allele_call: 6, confidence: 0.5, ..Default::default() }]);
        calvin.set_algorithm_name("Geno");
        assert_eq!(calvin_to_legacy(&calvin, None).algorithm_name, "GenotypingGeno");

        let mut calvin = CalvinChp::new(AssayType::Resequencing);
        calvin.set_algorithm_name("Tag");
        assert_eq!(calvin_to_legacy(&calvin, None).algorithm_name, "Tag");

        let mut calvin = CalvinChp::new(AssayType::Expression);
        calvin.set_algorithm_name("Plier");
        assert_eq!(calvin_to_legacy(&calvin, None).algorithm_name, "Plier");
    }

    #[test]
    fn chip_type_override() {
        use super::legacy_to_legacy;
        use crate::converter::options::ChpConversionOptions;

        let chp = mock_expression();
        let options = ChpConversionOptions { chip_type: Some("HG-U133A".to_string()) };

        assert_eq!(legacy_to_legacy(&chp, Some(&options)).chip_type, "HG-U133A");
        assert_eq!(legacy_to_legacy(&chp, None), chp);
    }
}
