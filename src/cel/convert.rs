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

//! Field-by-field copies between the CEL models.
//!
//! Going from the container form to the legacy model writes the four
//! algorithm parameters every legacy reader expects (see
//! [REQUIRED_PARAMS]) and names the algorithm `Percentile`. The grid
//! corners travel as typed `Grid*` float parameters in the container form
//! and through [GridCoordinates] in the legacy model.
//!
use crate::cel::calvin::CalvinCel;
use crate::cel::calvin::ARRAY_TYPE_PARAM;
use crate::cel::calvin::DAT_HEADER_PARAM;
use crate::cel::calvin::SCANNER_TYPE_PARAM;
use crate::cel::calvin::SCAN_ACQUISITION_TYPE;
use crate::cel::dat_header::parse_scanner_header;
use crate::cel::dat_header::DatHeaderError;
use crate::cel::CelFile;
use crate::cel::GridCoordinates;
use crate::cel::DEFAULT_CELL_MARGIN;
use crate::codec::narrow;
use crate::codec::widen;
use crate::converter::config::ConverterConfig;
use crate::converter::options::CelConversionOptions;
use crate::generic::GenericDataHeader;
use crate::parameter::atoi;
use crate::parameter::ParameterNameValue;
use crate::parameter::ParameterValue;

/// Algorithm parameters written first to every legacy CEL, with the
/// value used when the input does not have them.
pub const REQUIRED_PARAMS: [(&str, &str); 4] = [
    ("Percentile", "75"),
    ("CellMargin", "2"),
    ("OutlierHigh", "1.500"),
    ("OutlierLow", "1.004"),
];

/// Algorithm name written to legacy CEL files converted from the container format.
pub const LEGACY_ALGORITHM_NAME: &str = "Percentile";

const GRID_PREFIX: &str = "Grid";

/// Names of the grid corner parameters, in [GridCoordinates] field order.
pub const GRID_PARAMS: [&str; 8] = [
    "GridULX", "GridULY", "GridURX", "GridURY",
    "GridLRX", "GridLRY", "GridLLX", "GridLLY",
];

fn is_required_param(
    name: &str,
) -> bool {
    REQUIRED_PARAMS.iter().any(|(required, _)| *required == name)
}

/// Grid corner parameters are named `Grid` followed by at least one character.
fn is_grid_param(
    name: &str,
) -> bool {
    name.len() > GRID_PREFIX.len() && name.starts_with(GRID_PREFIX)
}

fn grid_values(
    grid: &GridCoordinates,
) -> [i32; 8] {
    [
        grid.upper_left_x, grid.upper_left_y, grid.upper_right_x, grid.upper_right_y,
        grid.lower_right_x, grid.lower_right_y, grid.lower_left_x, grid.lower_left_y,
    ]
}

/// Grid corners from the `Grid*` algorithm parameters.
///
/// Corners that are missing or not float valued are 0.
pub fn grid_from_params(
    cel: &CalvinCel,
) -> GridCoordinates {
    let v: Vec<i32> = GRID_PARAMS.iter().map(|name| {
        cel.find_algorithm_param(name).and_then(|p| p.value_float()).map(|x| x as i32).unwrap_or(0)
    }).collect();
    GridCoordinates {
        upper_left_x: v[0], upper_left_y: v[1], upper_right_x: v[2], upper_right_y: v[3],
        lower_right_x: v[4], lower_right_y: v[5], lower_left_x: v[6], lower_left_y: v[7],
    }
}

/// Cell margin from the `CellMargin` algorithm parameter.
///
/// Int32 values are used as is and ascii values are parsed. Any other
/// value or a missing parameter gives `default`.
pub fn cell_margin(
    cel: &CalvinCel,
    default: i32,
) -> i32 {
    match cel.find_algorithm_param("CellMargin").map(|p| p.value) {
        Some(ParameterValue::Int32(x)) => x,
        Some(ParameterValue::Ascii(s)) => atoi(&widen(&s)),
        _ => default,
    }
}

fn set_coords(
    cel: &mut CelFile,
    coords: &[(i16, i16)],
    outlier: bool,
) {
    coords.iter().for_each(|(x, y)| {
        if *x < 0 || *y < 0 || *x as usize >= cel.cols || *y as usize >= cel.rows {
            log::warn!("Ignoring cell ({}, {}) outside of the {}x{} array", x, y, cel.cols, cel.rows);
        } else if outlier {
            cel.set_outlier(*x as usize, *y as usize, true);
        } else {
            cel.set_masked(*x as usize, *y as usize, true);
        }
    });
}

/// Copies a container CEL into the legacy model.
///
/// Fails only if `options` renames the DAT file and the DAT header has no
/// file name field.
pub fn calvin_to_legacy(
    input: &CalvinCel,
    options: Option<&CelConversionOptions>,
) -> Result<CelFile, DatHeaderError> {
    let mut cel = CelFile::new(input.rows().max(0) as usize, input.cols().max(0) as usize);

    cel.intensities.iter_mut().zip(input.intensities.iter()).for_each(|(dst, src)| *dst = *src);
    cel.stdevs.iter_mut().zip(input.stdevs.iter()).for_each(|(dst, src)| *dst = *src);
    cel.pixels.iter_mut().zip(input.pixels.iter()).for_each(|(dst, src)| *dst = *src);
    set_coords(&mut cel, &input.outliers, true);
    set_coords(&mut cel, &input.masked, false);

    cel.grid = grid_from_params(input);
    let array_type = input.array_type();
    cel.chip_type = match options {
        Some(opts) => opts.chip_type_or(&array_type).to_string(),
        None => array_type,
    };
    cel.algorithm = LEGACY_ALGORITHM_NAME.to_string();

    let params = input.algorithm_params();
    for (name, default) in REQUIRED_PARAMS.iter() {
        let value = params.iter().find(|p| p.name == *name).map(|p| p.value.to_string());
        cel.set_param(name, &value.unwrap_or(default.to_string()));
    }
    cel.cell_margin = cell_margin(input, DEFAULT_CELL_MARGIN);

    params.iter()
        .filter(|p| !is_required_param(&p.name) && !is_grid_param(&p.name))
        .for_each(|p| cel.set_param(&p.name, &p.value.to_string()));

    let dat_header = input.dat_header();
    cel.dat_header = match options {
        Some(opts) => opts.dat_header(&dat_header)?,
        None => dat_header,
    };

    Ok(cel)
}

/// Copies a legacy CEL into a new legacy CEL, applying `options`.
pub fn legacy_to_legacy(
    input: &CelFile,
    options: Option<&CelConversionOptions>,
) -> Result<CelFile, DatHeaderError> {
    let mut cel = input.clone();
    if let Some(opts) = options {
        cel.chip_type = opts.chip_type_or(&input.chip_type).to_string();
        cel.dat_header = opts.dat_header(&input.dat_header_text())?;
    }
    Ok(cel)
}

/// Builds a scan acquisition header from the DAT header of a legacy CEL.
///
/// Records the DAT header, the array type and every field the scanner
/// header parser finds. The configured array id and barcode are added as
/// an array parent.
pub fn scan_acquisition_header(
    input: &CelFile,
    options: Option<&CelConversionOptions>,
    config: &ConverterConfig,
) -> Result<GenericDataHeader, DatHeaderError> {
    let mut header = GenericDataHeader::new(SCAN_ACQUISITION_TYPE);
    header.file_id.clear();

    let dat_header = match options {
        Some(opts) => opts.dat_header(&input.dat_header_text())?,
        None => input.dat_header_text(),
    };
    let chip_type = options.map(|opts| opts.chip_type_or(&input.chip_type)).unwrap_or(input.chip_type.as_str());

    header.add_param(ParameterNameValue::text(DAT_HEADER_PARAM, &dat_header));
    header.add_param(ParameterNameValue::text(ARRAY_TYPE_PARAM, chip_type));
    parse_scanner_header(&dat_header, config.scanner_type())
        .to_params()
        .into_iter()
        .for_each(|param| header.add_param(param));

    if let Some(array) = config.array_header() {
        header.add_parent(array);
    }
    Ok(header)
}

/// Copies a legacy CEL into the container form.
///
/// The legacy algorithm parameters become ascii parameters followed by the
/// grid corners as float parameters. The extra parameters in `config`
/// override header parameters, except the scanner type which only fills
/// in a missing scanner type of the synthesized parent.
///
/// The parent header is read from the configured parent file, or built
/// with [scan_acquisition_header] when there is none.
pub fn legacy_to_calvin(
    input: &CelFile,
    options: Option<&CelConversionOptions>,
    config: &ConverterConfig,
) -> Result<CalvinCel, DatHeaderError> {
    let mut cel = CalvinCel::new();

    input.params.iter().for_each(|(tag, value)| {
        cel.add_algorithm_param(ParameterNameValue::ascii(tag, &narrow(value)));
    });
    GRID_PARAMS.iter().zip(grid_values(&input.grid).iter()).for_each(|(name, value)| {
        cel.add_algorithm_param(ParameterNameValue::float(name, *value as f32));
    });

    cel.set_algorithm_name(&input.algorithm);
    let chip_type = options.map(|opts| opts.chip_type_or(&input.chip_type)).unwrap_or(input.chip_type.as_str());
    cel.set_array_type(chip_type);
    cel.set_dimensions(input.rows as i32, input.cols as i32);

    config.extra_parameters.iter()
        .filter(|p| p.name != SCANNER_TYPE_PARAM)
        .for_each(|p| cel.header.add_param(p.clone()));

    let parent = match config.parent_header() {
        Some(parent) => parent,
        None => scan_acquisition_header(input, options, config)?,
    };
    cel.header.add_parent(parent);

    cel.intensities = input.intensities.clone();
    cel.stdevs = input.stdevs.clone();
    cel.pixels = input.pixels.clone();
    cel.outliers = input.outlier_coords().into_iter().map(|(x, y)| (x as i16, y as i16)).collect();
    cel.masked = input.masked_coords().into_iter().map(|(x, y)| (x as i16, y as i16)).collect();

    Ok(cel)
}

// Tests
#[cfg(test)]
mod tests {

    const DAT_HEADER: &str = "[0..65535]  sample:CLS=100  RWS=200  XIN=3  YIN=3  VE=17        2.0 01/15/03 10:30:00 ScanID  TypeA  \x14 \x14 Test3.1sq \x14 \x14 \x14 \x14 \x14 5\x14 6.2\x140.8\x1411.0\x141\x14";

    fn mock_legacy() -> crate::cel::CelFile {
        use crate::cel::{CelFile, GridCoordinates};

        let mut cel = CelFile::new(5, 5);
        for idx in 0..25 {
            cel.intensities[idx] = idx as f32 * 3.25;
            cel.stdevs[idx] = idx as f32 / 7.0;
            cel.pixels[idx] = 9 + idx as i16;
        }
        cel.set_outlier(1, 0, true);
        cel.set_outlier(3, 2, true);
        cel.set_masked(4, 4, true);
        cel.grid = GridCoordinates {
            upper_left_x: 10, upper_left_y: 12, upper_right_x: 500, upper_right_y: 11,
            lower_right_x: 502, lower_right_y: 498, lower_left_x: 9, lower_left_y: 497,
        };
        cel.chip_type = "Test3".to_string();
        cel.dat_header = DAT_HEADER.to_string();
        cel.algorithm = "Percentile".to_string();
        cel.set_param("Percentile", "75");
        cel.set_param("CellMargin", "2");
        cel.set_param("OutlierHigh", "1.500");
        cel.set_param("OutlierLow", "1.004");
        cel.set_param("AlgVersion", "6.0");
        cel
    }

    #[test]
    fn legacy_to_calvin_and_back() {
        use super::{calvin_to_legacy, legacy_to_calvin};
        use crate::converter::config::ConverterConfig;

        let cel = mock_legacy();
        let calvin = legacy_to_calvin(&cel, None, &ConverterConfig::default()).unwrap();

        assert_eq!(calvin.rows(), 5);
        assert_eq!(calvin.cols(), 5);
        assert_eq!(calvin.array_type(), "Test3");
        assert_eq!(calvin.outliers, vec![(1, 0), (3, 2)]);
        assert_eq!(calvin.masked, vec![(4, 4)]);
        assert_eq!(calvin.dat_header(), DAT_HEADER);

        let got = calvin_to_legacy(&calvin, None).unwrap();
        assert_eq!(got, cel);
    }

    #[test]
    fn required_params_are_written_first() {
        use super::calvin_to_legacy;
        use crate::cel::calvin::CalvinCel;
        use crate::parameter::ParameterNameValue;

        let mut calvin = CalvinCel::new();
        calvin.set_dimensions(1, 1);
        calvin.intensities = vec![1.0];
        calvin.set_algorithm_name("Feature Extraction");
        calvin.add_algorithm_param(ParameterNameValue::ascii("Extra", b"x"));
        calvin.add_algorithm_param(ParameterNameValue::ascii("OutlierHigh", b"2.000"));

        let got = calvin_to_legacy(&calvin, None).unwrap();
        let names: Vec<&str> = got.params.keys().map(|x| x.as_str()).collect();

        assert_eq!(names, vec!["Percentile", "CellMargin", "OutlierHigh", "OutlierLow", "Extra"]);
        assert_eq!(got.param("Percentile"), Some("75"));
        assert_eq!(got.param("OutlierHigh"), Some("2.000"));
        assert_eq!(got.param("OutlierLow"), Some("1.004"));
        assert_eq!(got.algorithm, "Percentile");
        assert_eq!(got.cell_margin, 2);
    }

    #[test]
    fn grid_params_are_not_copied() {
        use super::calvin_to_legacy;
        use crate::cel::calvin::CalvinCel;
        use crate::parameter::ParameterNameValue;

        let mut calvin = CalvinCel::new();
        calvin.set_dimensions(1, 1);
        calvin.add_algorithm_param(ParameterNameValue::float("GridULX", 3.0));
        calvin.add_algorithm_param(ParameterNameValue::ascii("GridLLY", b"7"));
        calvin.add_algorithm_param(ParameterNameValue::ascii("GridSomething", b"x"));
        calvin.add_algorithm_param(ParameterNameValue::ascii("Grid", b"kept"));

        let got = calvin_to_legacy(&calvin, None).unwrap();

        assert!(got.params.keys().all(|name| name.len() <= 4 || !name.starts_with("Grid")));
        assert_eq!(got.param("Grid"), Some("kept"));
        assert_eq!(got.grid.upper_left_x, 3);
        // not float valued
        assert_eq!(got.grid.lower_left_y, 0);
    }

    #[test]
    fn cell_margin_by_type() {
        use super::cell_margin;
        use crate::cel::calvin::CalvinCel;
        use crate::parameter::ParameterNameValue;

        let mut calvin = CalvinCel::new();
        assert_eq!(cell_margin(&calvin, 2), 2);

        calvin.add_algorithm_param(ParameterNameValue::int32("CellMargin", 5));
        assert_eq!(cell_margin(&calvin, 2), 5);

        calvin.add_algorithm_param(ParameterNameValue::ascii("CellMargin", b"4"));
        assert_eq!(cell_margin(&calvin, 2), 4);

        calvin.add_algorithm_param(ParameterNameValue::float("CellMargin", 4.0));
        assert_eq!(cell_margin(&calvin, 2), 2);
    }

    #[test]
    fn synthesized_parent_header() {
        use super::legacy_to_calvin;
        use crate::converter::config::ConverterConfig;
        use crate::parameter::ParameterNameValue;

        let config = ConverterConfig {
            extra_parameters: vec![
                ParameterNameValue::text("affymetrix-scanner-type", "M10"),
                ParameterNameValue::text("affymetrix-operator", "someone"),
            ],
            array_id: Some("abc-123".to_string()),
            ..Default::default()
        };
        let calvin = legacy_to_calvin(&mock_legacy(), None, &config).unwrap();

        assert!(calvin.header.find_param("affymetrix-scanner-type").is_none());
        assert_eq!(calvin.header.find_param("affymetrix-operator").and_then(|p| p.value_text()), Some("someone"));

        let parent = &calvin.header.parents[0];
        assert_eq!(parent.file_type_id, "affymetrix-calvin-scan-acquisition");
        assert_eq!(parent.file_id, "");
        assert_eq!(parent.find_param("affymetrix-array-type").and_then(|p| p.value_text()), Some("Test3"));
        assert_eq!(parent.find_param("affymetrix-pixel-rows").and_then(|p| p.value_int32()), Some(100));
        assert_eq!(parent.find_param("affymetrix-scanner-type").and_then(|p| p.value_text()), Some("TypeA"));
        assert_eq!(parent.find_param("affymetrix-image-orientation").and_then(|p| p.value_uint8()), Some(1));
        assert_eq!(parent.parents[0].find_param("affymetrix-array-id").and_then(|p| p.value_text()), Some("abc-123"));
    }

    #[test]
    fn parent_from_parent_file() {
        use super::legacy_to_calvin;
        use crate::converter::config::ConverterConfig;
        use crate::generic::writer::write_generic_file;
        use crate::generic::{GenericData, GenericDataHeader};
        use crate::parameter::ParameterNameValue;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parent.DAT");
        let mut header = GenericDataHeader::new("affymetrix-calvin-scan-acquisition");
        header.add_param(ParameterNameValue::text("affymetrix-dat-header", "[1..2]  parent:CLS=1"));
        write_generic_file(&GenericData::new(header.clone()), &path).unwrap();

        let config = ConverterConfig { parent_file: Some(path), ..Default::default() };
        let calvin = legacy_to_calvin(&mock_legacy(), None, &config).unwrap();

        assert_eq!(calvin.header.parents, vec![header]);
        assert_eq!(calvin.dat_header(), "[1..2]  parent:CLS=1");
    }

    #[test]
    fn options_rename_dat_and_override_chip() {
        use super::{calvin_to_legacy, legacy_to_calvin, legacy_to_legacy};
        use crate::converter::config::ConverterConfig;
        use crate::converter::options::CelConversionOptions;

        let options = CelConversionOptions { chip_type: Some("Other".to_string()), dat_file_name: Some("renamed".to_string()) };
        let cel = mock_legacy();

        let legacy = legacy_to_legacy(&cel, Some(&options)).unwrap();
        assert_eq!(legacy.chip_type, "Other");
        assert!(legacy.dat_header_text().starts_with("[0..65535]  renamed:CLS=100"));
        assert!(legacy.dat_header_text().contains("Other.1sq"));

        let calvin = legacy_to_calvin(&cel, Some(&options), &ConverterConfig::default()).unwrap();
        assert_eq!(calvin.array_type(), "Other");
        assert!(calvin.dat_header().starts_with("[0..65535]  renamed:CLS=100"));

        let back = calvin_to_legacy(&calvin, Some(&options)).unwrap();
        assert_eq!(back.chip_type, "Other");

        let mut unparseable = cel.clone();
        unparseable.dat_header = "no markers".to_string();
        assert!(legacy_to_legacy(&unparseable, Some(&options)).is_err());
        assert!(legacy_to_calvin(&unparseable, Some(&options), &ConverterConfig::default()).is_err());
    }
}
