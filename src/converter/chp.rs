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

use crate::chp::calvin::is_calvin_chp;
use crate::chp::calvin::read_calvin_chp;
use crate::chp::calvin::write_calvin_chp;
use crate::chp::convert;
use crate::chp::mas5::is_mas5;
use crate::chp::read_legacy_chp;
use crate::chp::write_legacy_chp;
use crate::chp::xda::is_chp_xda;
use crate::chp::LegacyChpFormat;
use crate::codec::read_file_head;
use crate::codec::SNIFF_LEN;
use crate::converter::config::ConverterConfig;
use crate::converter::options::ChpConversionOptions;
use crate::converter::convert_in_place;
use crate::converter::convert_to_path;
use crate::converter::copy_unchanged;
use crate::converter::ConversionError;
use crate::converter::CopyFn;

/// CHP file versions.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChpFileVersion {
    #[default]
    Unknown,
    Gcos,
    Calvin,
    Mas5,
}

impl ChpFileVersion {
    /// Version number used on the command line.
    pub fn from_i32(value: i32) -> Option<ChpFileVersion> {
        match value {
            1 => Some(ChpFileVersion::Gcos),
            2 => Some(ChpFileVersion::Calvin),
            3 => Some(ChpFileVersion::Mas5),
            _ => None,
        }
    }

    pub fn to_i32(&self) -> i32 {
        match self {
            ChpFileVersion::Unknown => 0,
            ChpFileVersion::Gcos => 1,
            ChpFileVersion::Calvin => 2,
            ChpFileVersion::Mas5 => 3,
        }
    }

    /// Version of the CHP file in `bytes`.
    ///
    /// The container format is checked first. Only the first
    /// [SNIFF_LEN] bytes of a file are needed.
    pub fn sniff(bytes: &[u8]) -> ChpFileVersion {
        if is_calvin_chp(bytes) {
            ChpFileVersion::Calvin
        } else if is_chp_xda(bytes) {
            ChpFileVersion::Gcos
        } else if is_mas5(bytes) {
            ChpFileVersion::Mas5
        } else {
            ChpFileVersion::Unknown
        }
    }

    /// Version of the CHP file at `path`, Unknown if it cannot be read.
    pub fn of_file(path: &Path) -> ChpFileVersion {
        match read_file_head(path, SNIFF_LEN) {
            Ok(bytes) => ChpFileVersion::sniff(&bytes),
            Err(e) => {
                log::debug!("Unable to read {}: {}", path.display(), e);
                ChpFileVersion::Unknown
            },
        }
    }
}

impl std::fmt::Display for ChpFileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChpFileVersion::Unknown => write!(f, "unknown"),
            ChpFileVersion::Gcos => write!(f, "GCOS (1)"),
            ChpFileVersion::Calvin => write!(f, "container (2)"),
            ChpFileVersion::Mas5 => write!(f, "MAS5 (3)"),
        }
    }
}

fn open_error(
    path: &Path,
    e: Box<dyn std::error::Error>,
) -> ConversionError {
    log::warn!("Unable to read {}: {}", path.display(), e);
    ConversionError::UnableToOpenChpFile
}

fn write_error(
    path: &Path,
    e: Box<dyn std::error::Error>,
) -> ConversionError {
    log::warn!("Unable to write {}: {}", path.display(), e);
    ConversionError::UnableToWriteTheFile
}

fn legacy_to_calvin(
    source: &Path,
    dest: &Path,
    options: Option<&ChpConversionOptions>,
    config: &ConverterConfig,
) -> Result<(), ConversionError> {
    let (input, format) = read_legacy_chp(source).map_err(|e| open_error(source, e))?;
    let output = convert::legacy_to_calvin(&input, format, options, config)?;
    write_calvin_chp(&output, dest).map_err(|e| write_error(dest, e))
}

fn calvin_to_legacy(
    source: &Path,
    dest: &Path,
    format: LegacyChpFormat,
    options: Option<&ChpConversionOptions>,
) -> Result<(), ConversionError> {
    let input = read_calvin_chp(source).map_err(|e| open_error(source, e))?;
    let output = convert::calvin_to_legacy(&input, options);
    write_legacy_chp(&output, dest, format).map_err(|e| write_error(dest, e))
}

fn legacy_to_legacy(
    source: &Path,
    dest: &Path,
    format: LegacyChpFormat,
    options: Option<&ChpConversionOptions>,
) -> Result<(), ConversionError> {
    let (input, _) = read_legacy_chp(source).map_err(|e| open_error(source, e))?;
    let output = convert::legacy_to_legacy(&input, options);
    write_legacy_chp(&output, dest, format).map_err(|e| write_error(dest, e))
}

/// Supported conversions keyed by input and output version.
const CONVERSIONS: [(ChpFileVersion, ChpFileVersion, CopyFn<ChpConversionOptions>); 6] = [
    (ChpFileVersion::Gcos, ChpFileVersion::Calvin, legacy_to_calvin),
    (ChpFileVersion::Mas5, ChpFileVersion::Calvin, legacy_to_calvin),
    (ChpFileVersion::Calvin, ChpFileVersion::Gcos, |s, d, o, _| calvin_to_legacy(s, d, LegacyChpFormat::Gcos, o)),
    (ChpFileVersion::Calvin, ChpFileVersion::Mas5, |s, d, o, _| calvin_to_legacy(s, d, LegacyChpFormat::Mas5, o)),
    (ChpFileVersion::Mas5, ChpFileVersion::Gcos, |s, d, o, _| legacy_to_legacy(s, d, LegacyChpFormat::Gcos, o)),
    (ChpFileVersion::Gcos, ChpFileVersion::Mas5, |s, d, o, _| legacy_to_legacy(s, d, LegacyChpFormat::Mas5, o)),
];

/// Copy routine converting `from` into `to`.
pub fn conversion(
    from: ChpFileVersion,
    to: ChpFileVersion,
) -> Option<CopyFn<ChpConversionOptions>> {
    CONVERSIONS.iter().find(|(f, t, _)| *f == from && *t == to).map(|(_, _, copy)| *copy)
}

/// Converts CHP files between versions.
///
/// Converting into the container version needs the probe set names from
/// the library files in [ConverterConfig::library_path].
///
/// ## Usage
///
/// ```rust
/// use celchp::converter::{ChpFileConverter, ChpFileVersion, ConversionError};
/// use celchp::converter::config::ConverterConfig;
///
/// let mut converter = ChpFileConverter::new(ConverterConfig::default());
/// let got = converter.convert_file(std::path::Path::new("/nonexistent.CHP"), ChpFileVersion::Calvin, None);
///
/// assert_eq!(got, Err(ConversionError::FileDoesNotExist));
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct ChpFileConverter {
    pub config: ConverterConfig,
    error: Option<ConversionError>,
}

impl ChpFileConverter {
    pub fn new(config: ConverterConfig) -> Self {
        ChpFileConverter { config, error: None }
    }

    /// Error of the last conversion, None if it succeeded.
    pub fn error_code(&self) -> Option<ConversionError> {
        self.error
    }

    fn check(
        &self,
        path: &Path,
        to: ChpFileVersion,
    ) -> Result<ChpFileVersion, ConversionError> {
        if to == ChpFileVersion::Unknown {
            return Err(ConversionError::InvalidConversionInputs)
        }
        if !path.is_file() {
            return Err(ConversionError::FileDoesNotExist)
        }
        let from = ChpFileVersion::of_file(path);
        log::debug!("{} is a {} CHP file", path.display(), from);
        match from {
            ChpFileVersion::Unknown => Err(ConversionError::InvalidChpFileFormat),
            _ => Ok(from),
        }
    }

    fn run(
        &self,
        source: &Path,
        dest: Option<&Path>,
        to: ChpFileVersion,
        options: Option<&ChpConversionOptions>,
    ) -> Result<(), ConversionError> {
        log::info!("Checking {}", source.display());
        let from = self.check(source, to)?;
        if from == to {
            if options.is_some() {
                return Err(ConversionError::UnableToMixConversionOptionsAndNoFormatChange)
            }
            log::info!("{} is already a {} CHP file", source.display(), to);
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

    /// Converts the CHP file at `path` to version `to` in place.
    pub fn convert_file(
        &mut self,
        path: &Path,
        to: ChpFileVersion,
        options: Option<&ChpConversionOptions>,
    ) -> Result<(), ConversionError> {
        let res = self.run(path, None, to, options);
        self.error = res.err();
        res
    }

    /// Converts the CHP file at `source` to version `to` and writes it to `dest`.
    pub fn convert_file_to(
        &mut self,
        source: &Path,
        dest: &Path,
        to: ChpFileVersion,
        options: Option<&ChpConversionOptions>,
    ) -> Result<(), ConversionError> {
        let res = self.run(source, Some(dest), to, options);
        self.error = res.err();
        res
    }
}
