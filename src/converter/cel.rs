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
use std::path::Path;

use crate::cel::calvin::is_calvin_cel;
use crate::cel::calvin::read_calvin_cel;
use crate::cel::calvin::write_calvin_cel;
use crate::cel::convert;
use crate::cel::read_legacy_cel;
use crate::cel::text::is_text;
use crate::cel::write_legacy_cel;
use crate::cel::xda::is_xda;
use crate::cel::LegacyCelFormat;
use crate::codec::read_file_head;
use crate::codec::SNIFF_LEN;
use crate::converter::config::ConverterConfig;
use crate::converter::options::CelConversionOptions;
use crate::converter::convert_in_place;
use crate::converter::convert_to_path;
use crate::converter::copy_unchanged;
use crate::converter::ConversionError;
use crate::converter::CopyFn;

/// CEL file versions.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CelFileVersion {
    #[default]
    Unknown,
    Calvin,
    Text,
    Xda,
}

impl CelFileVersion {
    /// Version number used on the command line.
    pub fn from_i32(value: i32) -> Option<CelFileVersion> {
        match value {
            1 => Some(CelFileVersion::Calvin),
            3 => Some(CelFileVersion::Text),
            4 => Some(CelFileVersion::Xda),
            _ => None,
        }
    }

    pub fn to_i32(&self) -> i32 {
        match self {
            CelFileVersion::Unknown => 0,
            CelFileVersion::Calvin => 1,
            CelFileVersion::Text => 3,
            CelFileVersion::Xda => 4,
        }
    }

    /// Version of the CEL file in `bytes`.
    ///
    /// The container format is checked first. Only the first
    /// [SNIFF_LEN] bytes of a file are needed.
    pub fn sniff(bytes: &[u8]) -> CelFileVersion {
        if is_calvin_cel(bytes) {
            CelFileVersion::Calvin
        } else if is_xda(bytes) {
            CelFileVersion::Xda
        } else if is_text(bytes) {
            CelFileVersion::Text
        } else {
            CelFileVersion::Unknown
        }
    }

    /// Version of the CEL file at `path`, Unknown if it cannot be read.
    pub fn of_file(path: &Path) -> CelFileVersion {
        match read_file_head(path, SNIFF_LEN) {
            Ok(bytes) => CelFileVersion::sniff(&bytes),
            Err(e) => {
                log::debug!("Unable to read {}: {}", path.display(), e);
                CelFileVersion::Unknown
            },
        }
    }

    fn legacy_format(&self) -> Option<LegacyCelFormat> {
        match self {
            CelFileVersion::Text => Some(LegacyCelFormat::Text),
            CelFileVersion::Xda => Some(LegacyCelFormat::Xda),
            _ => None,
        }
    }
}

impl std::fmt::Display for CelFileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CelFileVersion::Unknown => write!(f, "unknown"),
            CelFileVersion::Calvin => write!(f, "container (1)"),
            CelFileVersion::Text => write!(f, "text (3)"),
            CelFileVersion::Xda => write!(f, "XDA (4)"),
        }
    }
}

fn write_error(
    path: &Path,
    e: Box<dyn std::error::Error>,
) -> ConversionError {
    log::warn!("Unable to write {}: {}", path.display(), e);
    ConversionError::UnableToWriteTheFile
}

fn open_error(
    path: &Path,
    e: Box<dyn std::error::Error>,
) -> ConversionError {
    log::warn!("Unable to read {}: {}", path.display(), e);
    ConversionError::UnableToOpenCelFile
}

fn dat_error(
    e: crate::cel::dat_header::DatHeaderError,
) -> ConversionError {
    log::warn!("{}", e);
    ConversionError::UnableToParseDatHeader
}

fn legacy_to_calvin(
    source: &Path,
    dest: &Path,
    options: Option<&CelConversionOptions>,
    config: &ConverterConfig,
) -> Result<(), ConversionError> {
    let (input, _) = read_legacy_cel(source).map_err(|e| open_error(source, e))?;
    let output = convert::legacy_to_calvin(&input, options, config).map_err(dat_error)?;
    write_calvin_cel(&output, dest).map_err(|e| write_error(dest, e))
}

fn calvin_to_legacy(
    source: &Path,
    dest: &Path,
    format: LegacyCelFormat,
    options: Option<&CelConversionOptions>,
) -> Result<(), ConversionError> {
    let input = read_calvin_cel(source).map_err(|e| open_error(source, e))?;
    let output = convert::calvin_to_legacy(&input, options).map_err(dat_error)?;
    write_legacy_cel(&output, dest, format).map_err(|e| write_error(dest, e))
}

fn legacy_to_legacy(
    source: &Path,
    dest: &Path,
    format: LegacyCelFormat,
    options: Option<&CelConversionOptions>,
) -> Result<(), ConversionError> {
    let (input, _) = read_legacy_cel(source).map_err(|e| open_error(source, e))?;
    let output = convert::legacy_to_legacy(&input, options).map_err(dat_error)?;
    write_legacy_cel(&output, dest, format).map_err(|e| write_error(dest, e))
}

/// Supported conversions keyed by input and output version.
const CONVERSIONS: [(CelFileVersion, CelFileVersion, CopyFn<CelConversionOptions>); 6] = [
    (CelFileVersion::Xda, CelFileVersion::Calvin, legacy_to_calvin),
    (CelFileVersion::Text, CelFileVersion::Calvin, legacy_to_calvin),
    (CelFileVersion::Calvin, CelFileVersion::Xda, |s, d, o, _| calvin_to_legacy(s, d, LegacyCelFormat::Xda, o)),
    (CelFileVersion::Calvin, CelFileVersion::Text, |s, d, o, _| calvin_to_legacy(s, d, LegacyCelFormat::Text, o)),
    (CelFileVersion::Text, CelFileVersion::Xda, |s, d, o, _| legacy_to_legacy(s, d, LegacyCelFormat::Xda, o)),
    (CelFileVersion::Xda, CelFileVersion::Text, |s, d, o, _| legacy_to_legacy(s, d, LegacyCelFormat::Text, o)),
];

/// Copy routine converting `from` into `to`.
pub fn conversion(
    from: CelFileVersion,
    to: CelFileVersion,
) -> Option<CopyFn<CelConversionOptions>> {
    CONVERSIONS.iter().find(|(f, t, _)| *f == from && *t == to).map(|(_, _, copy)| *copy)
}

/// Converts CEL files between versions.
///
/// ## Usage
///
/// ```rust
/// use celchp::converter::{CelFileConverter, CelFileVersion, ConversionError};
/// use celchp::converter::config::ConverterConfig;
///
/// let mut converter = CelFileConverter::new(ConverterConfig::default());
/// let got = converter.convert_file(std::path::Path::new("/nonexistent.CEL"), CelFileVersion::Xda, None);
///
/// assert_eq!(got, Err(ConversionError::FileDoesNotExist));
/// assert_eq!(converter.error_code(), Some(ConversionError::FileDoesNotExist));
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct CelFileConverter {
    pub config: ConverterConfig,
    error: Option<ConversionError>,
}

impl CelFileConverter {
    pub fn new(config: ConverterConfig) -> Self {
        CelFileConverter { config, error: None }
    }

    /// Error of the last conversion, None if it succeeded.
    pub fn error_code(&self) -> Option<ConversionError> {
        self.error
    }

    fn check(
        &self,
        path: &Path,
        to: CelFileVersion,
    ) -> Result<CelFileVersion, ConversionError> {
        if to == CelFileVersion::Unknown {
            return Err(ConversionError::InvalidConversionInputs)
        }
        if !path.is_file() {
            return Err(ConversionError::FileDoesNotExist)
        }
        let from = CelFileVersion::of_file(path);
        log::debug!("{} is a {} CEL file", path.display(), from);
        match from {
            CelFileVersion::Unknown => Err(ConversionError::InvalidCelFileFormat),
            _ => Ok(from),
        }
    }

    fn run(
        &self,
        source: &Path,
        dest: Option<&Path>,
        to: CelFileVersion,
        options: Option<&CelConversionOptions>,
    ) -> Result<(), ConversionError> {
        log::info!("Checking {}", source.display());
        let from = self.check(source, to)?;
        if from == to {
            if options.is_some() {
                return Err(ConversionError::UnableToMixConversionOptionsAndNoFormatChange)
            }
            log::info!("{} is already a {} CEL file", source.display(), to);
            return match dest {
                Some(dest) => copy_unchanged(source, dest),
                None => Ok(()),
            }
        }
        let copy = conversion(from, to).ok_or(ConversionError::InvalidConversionInputs)?;

        log::info!("Converting {} from {} to {}", source.display(), from, to);
        let res = match dest {
            Some(dest) if dest != source => convert_to_path(source, dest, |s, d| copy(s, d, options, &self.config)),
            _ => convert_in_place(source, self.config.keep_backup, |s, d| copy(s, d, options, &self.config)),
        };
        if res.is_ok() {
            log::info!("Converted {}", dest.unwrap_or(source).display());
        }
        res
    }

    /// Converts the CEL file at `path` to version `to` in place.
    pub fn convert_file(
        &mut self,
        path: &Path,
        to: CelFileVersion,
        options: Option<&CelConversionOptions>,
    ) -> Result<(), ConversionError> {
        let res = self.run(path, None, to, options);
        self.error = res.err();
        res
    }

    /// Converts the CEL file at `source` to version `to` and writes it to `dest`.
    pub fn convert_file_to(
        &mut self,
        source: &Path,
        dest: &Path,
        to: CelFileVersion,
        options: Option<&CelConversionOptions>,
    ) -> Result<(), ConversionError> {
        let res = self.run(source, Some(dest), to, options);
        self.error = res.err();
        res
    }
}

// Tests
#[cfg(test)]
mod tests {

    const DAT_HEADER: &str = "[0..65535]  sample:CLS=5  RWS=5  XIN=3  YIN=3  VE=17        2.0 01/15/03 10:30:00 ScanID  TypeA  \x14 \x14 Test3.1sq \x14 \x14 \x14 \x14 \x14 5\x14 6.2\x140.8\x1411.0\x141\x14";

    fn mock_cel() -> crate::cel::CelFile {
        use crate::cel::CelFile;

        let mut cel = CelFile::new(5, 5);
        for idx in 0..25 {
            cel.intensities[idx] = idx as f32 * 1.5 + 0.25;
            cel.stdevs[idx] = idx as f32 / 3.0;
            cel.pixels[idx] = 16;
        }
        cel.set_outlier(0, 1, true);
        cel.set_outlier(2, 3, true);
        cel.set_masked(4, 0, true);
        cel.chip_type = "Test3".to_string();
        cel.dat_header = DAT_HEADER.to_string();
        cel.algorithm = "Percentile".to_string();
        cel.set_param("Percentile", "75");
        cel.set_param("CellMargin", "2");
        cel.set_param("OutlierHigh", "1.500");
        cel.set_param("OutlierLow", "1.004");
        cel
    }

    fn write_xda(
        dir: &std::path::Path,
    ) -> std::path::PathBuf {
        use crate::cel::{write_legacy_cel, LegacyCelFormat};

        let path = dir.join("test.CEL");
        write_legacy_cel(&mock_cel(), &path, LegacyCelFormat::Xda).unwrap();
        path
    }

    #[test]
    fn versions() {
        use super::CelFileVersion;

        assert_eq!(CelFileVersion::from_i32(4), Some(CelFileVersion::Xda));
        assert_eq!(CelFileVersion::from_i32(2), None);
        assert_eq!(CelFileVersion::Text.to_i32(), 3);
        assert_eq!(CelFileVersion::sniff(b"[CEL]\nVersion=3\n"), CelFileVersion::Text);
        assert_eq!(CelFileVersion::sniff(b"GeneChip"), CelFileVersion::Unknown);
    }

    #[test]
    fn version_of_container_with_long_header() {
        use super::CelFileVersion;
        use crate::cel::calvin::{write_calvin_cel, CalvinCel};
        use crate::parameter::ParameterNameValue;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.CEL");
        let mut cel = CalvinCel::new();
        cel.set_dimensions(1, 1);
        cel.intensities = vec![1.0];
        cel.add_algorithm_param(ParameterNameValue::text("Notes", &"x".repeat(10000)));
        write_calvin_cel(&cel, &path).unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 20000);
        assert_eq!(CelFileVersion::of_file(&path), CelFileVersion::Calvin);
    }

    #[test]
    fn conversion_table() {
        use super::{conversion, CelFileVersion};

        assert!(conversion(CelFileVersion::Xda, CelFileVersion::Calvin).is_some());
        assert!(conversion(CelFileVersion::Calvin, CelFileVersion::Text).is_some());
        assert!(conversion(CelFileVersion::Calvin, CelFileVersion::Calvin).is_none());
        assert!(conversion(CelFileVersion::Unknown, CelFileVersion::Xda).is_none());
    }

    #[test]
    fn xda_to_calvin_and_back_in_place() {
        use super::{CelFileConverter, CelFileVersion};
        use crate::cel::read_legacy_cel;
        use crate::converter::backup_path;
        use crate::converter::config::ConverterConfig;

        let dir = tempfile::tempdir().unwrap();
        let path = write_xda(dir.path());
        let mut converter = CelFileConverter::new(ConverterConfig::default());

        converter.convert_file(&path, CelFileVersion::Calvin, None).unwrap();
        assert_eq!(CelFileVersion::of_file(&path), CelFileVersion::Calvin);
        assert!(!backup_path(&path).exists());

        converter.convert_file(&path, CelFileVersion::Xda, None).unwrap();
        assert_eq!(converter.error_code(), None);

        let (got, _) = read_legacy_cel(&path).unwrap();
        let cel = mock_cel();
        assert_eq!(got.intensities, cel.intensities);
        assert_eq!(got.stdevs, cel.stdevs);
        assert_eq!(got.pixels, cel.pixels);
        assert_eq!(got.outlier_coords(), vec![(0, 1), (2, 3)]);
        assert_eq!(got.masked_coords(), vec![(4, 0)]);
        assert_eq!(got.dat_header, DAT_HEADER);
    }

    #[test]
    fn same_version_is_a_no_op() {
        use super::{CelFileConverter, CelFileVersion};
        use crate::converter::config::ConverterConfig;
        use crate::converter::options::CelConversionOptions;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let path = write_xda(dir.path());
        let before = std::fs::read(&path).unwrap();
        let mut converter = CelFileConverter::new(ConverterConfig::default());

        converter.convert_file(&path, CelFileVersion::Xda, None).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);

        let options = CelConversionOptions { chip_type: Some("HG-U133A".to_string()), ..Default::default() };
        let got = converter.convert_file(&path, CelFileVersion::Xda, Some(&options));
        assert_eq!(got, Err(ConversionError::UnableToMixConversionOptionsAndNoFormatChange));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn failed_rename_restores_input() {
        use super::{CelFileConverter, CelFileVersion};
        use crate::converter::backup_path;
        use crate::converter::config::ConverterConfig;
        use crate::converter::options::CelConversionOptions;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.CEL");
        let mut cel = mock_cel();
        cel.dat_header = "no markers here".to_string();
        crate::cel::write_legacy_cel(&cel, &path, crate::cel::LegacyCelFormat::Xda).unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut converter = CelFileConverter::new(ConverterConfig::default());
        let options = CelConversionOptions { dat_file_name: Some("renamed".to_string()), ..Default::default() };
        let got = converter.convert_file(&path, CelFileVersion::Calvin, Some(&options));

        assert_eq!(got, Err(ConversionError::UnableToParseDatHeader));
        assert_eq!(converter.error_code(), Some(ConversionError::UnableToParseDatHeader));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn convert_to_second_file() {
        use super::{CelFileConverter, CelFileVersion};
        use crate::cel::read_legacy_cel;
        use crate::converter::config::ConverterConfig;

        let dir = tempfile::tempdir().unwrap();
        let source = write_xda(dir.path());
        let dest = dir.path().join("test.txt.CEL");
        let before = std::fs::read(&source).unwrap();

        let mut converter = CelFileConverter::new(ConverterConfig { keep_backup: true, ..Default::default() });
        converter.convert_file_to(&source, &dest, CelFileVersion::Text, None).unwrap();

        assert_eq!(std::fs::read(&source).unwrap(), before);
        assert_eq!(CelFileVersion::of_file(&dest), CelFileVersion::Text);
        let (got, _) = read_legacy_cel(&dest).unwrap();
        assert_eq!(got.masked_coords(), vec![(4, 0)]);
    }

    #[test]
    fn missing_and_unrecognized_inputs() {
        use super::{CelFileConverter, CelFileVersion};
        use crate::converter::config::ConverterConfig;
        use crate::converter::ConversionError;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.CEL");
        std::fs::write(&path, b"junk").unwrap();
        let mut converter = CelFileConverter::new(ConverterConfig::default());

        assert_eq!(converter.convert_file(&dir.path().join("missing.CEL"), CelFileVersion::Xda, None), Err(ConversionError::FileDoesNotExist));
        assert_eq!(converter.convert_file(&path, CelFileVersion::Xda, None), Err(ConversionError::InvalidCelFileFormat));
        assert_eq!(converter.convert_file(&path, CelFileVersion::Unknown, None), Err(ConversionError::InvalidConversionInputs));
    }
}
