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

//! File conversion engines.
//!
//! [CelFileConverter] and [ChpFileConverter] check the input, pick the
//! copy routine for the pair of input and output versions from a fixed
//! table, and run it either in place or into a second file.
//!
//! In place, the input is first renamed to `<file>.bak`. The backup is
//! removed after a successful conversion, unless
//! [ConverterConfig::keep_backup](config::ConverterConfig) is set, and
//! renamed back over the partially written output if the conversion
//! fails. Converting into a second file removes a partially written
//! output on failure instead.
//!
//! The first error of a conversion is returned and kept by the engine
//! until its next conversion (see [CelFileConverter::error_code]).
//!

pub mod cel;
pub mod chp;
pub mod config;
pub mod options;

use std::path::Path;
use std::path::PathBuf;

pub use cel::{CelFileConverter, CelFileVersion};
pub use chp::{ChpFileConverter, ChpFileVersion};

/// Reasons a conversion fails.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionError {
    InvalidConversionInputs,
    FileDoesNotExist,
    UnableToOpenCelFile,
    UnableToOpenChpFile,
    InvalidCelFileFormat,
    InvalidChpFileFormat,
    UnableToRenameInputFile,
    UnableToWriteTheFile,
    UnableToMixConversionOptionsAndNoFormatChange,
    UnableToCopyFile,
    UnableToParseDatHeader,
    UnableToLoadProbeSetNames,
    UnableToOpenParentCelFile,
    UnableToReadCdfFile,
    InvalidAlgorithmType,
    InvalidAssayType,
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let message = match self {
            ConversionError::InvalidConversionInputs => "Invalid conversion inputs.",
            ConversionError::FileDoesNotExist => "The input file does not exist.",
            ConversionError::UnableToOpenCelFile => "Unable to open the CEL file.",
            ConversionError::UnableToOpenChpFile => "Unable to open the CHP file.",
            ConversionError::InvalidCelFileFormat => "Invalid CEL file format.",
            ConversionError::InvalidChpFileFormat => "Invalid CHP file format.",
            ConversionError::UnableToRenameInputFile => "Unable to rename the input file.",
            ConversionError::UnableToWriteTheFile => "Unable to write the file.",
            ConversionError::UnableToMixConversionOptionsAndNoFormatChange => "Unable to apply conversion options without a change in file format.",
            ConversionError::UnableToCopyFile => "Unable to copy the file.",
            ConversionError::UnableToParseDatHeader => "Unable to parse the DAT header.",
            ConversionError::UnableToLoadProbeSetNames => "Unable to load the probe set names.",
            ConversionError::UnableToOpenParentCelFile => "Unable to open the parent CEL file.",
            ConversionError::UnableToReadCdfFile => "Unable to read the CDF file.",
            ConversionError::InvalidAlgorithmType => "Invalid algorithm type.",
            ConversionError::InvalidAssayType => "Invalid assay type.",
        };
        write!(f, "{}", message)
    }
}

impl std::error::Error for ConversionError {}

/// Reads `source` and writes the converted file to the second path.
pub type CopyFn<O> = fn(
    &Path,
    &Path,
    Option<&O>,
    &config::ConverterConfig,
) -> Result<(), ConversionError>;

/// Path of the backup of `path` made for an in-place conversion.
pub fn backup_path(
    path: &Path,
) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn remove_partial(
    path: &Path,
) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Unable to remove partially written {}: {}", path.display(), e);
        }
    }
}

/// Runs `copy` from `path` into itself through a `.bak` backup.
pub(crate) fn convert_in_place<F>(
    path: &Path,
    keep_backup: bool,
    copy: F,
) -> Result<(), ConversionError>
where
    F: FnOnce(&Path, &Path) -> Result<(), ConversionError>,
{
    let backup = backup_path(path);
    if backup.exists() {
        log::warn!("Backup {} already exists", backup.display());
        return Err(ConversionError::UnableToRenameInputFile)
    }
    if let Err(e) = std::fs::rename(path, &backup) {
        log::warn!("Unable to rename {} to {}: {}", path.display(), backup.display(), e);
        return Err(ConversionError::UnableToRenameInputFile)
    }
    log::debug!("Backed up {} to {}", path.display(), backup.display());

    match copy(&backup, path) {
        Ok(()) => {
            if !keep_backup {
                if let Err(e) = std::fs::remove_file(&backup) {
                    log::warn!("Unable to remove backup {}: {}", backup.display(), e);
                }
            }
            Ok(())
        },
        Err(e) => {
            remove_partial(path);
            match std::fs::rename(&backup, path) {
                Ok(()) => log::info!("Restored {} after failed conversion: {}", path.display(), e),
                Err(io) => log::warn!("Unable to restore {} from {}: {}", path.display(), backup.display(), io),
            }
            Err(e)
        },
    }
}

/// Runs `copy` from `source` into `dest`, removing `dest` on failure.
pub(crate) fn convert_to_path<F>(
    source: &Path,
    dest: &Path,
    copy: F,
) -> Result<(), ConversionError>
where
    F: FnOnce(&Path, &Path) -> Result<(), ConversionError>,
{
    let res = copy(source, dest);
    if let Err(e) = &res {
        log::info!("Removing {} after failed conversion: {}", dest.display(), e);
        remove_partial(dest);
    }
    res
}

/// Copies `source` to `dest` unchanged.
pub(crate) fn copy_unchanged(
    source: &Path,
    dest: &Path,
) -> Result<(), ConversionError> {
    if source == dest {
        return Ok(())
    }
    std::fs::copy(source, dest).map_err(|e| {
        log::warn!("Unable to copy {} to {}: {}", source.display(), dest.display(), e);
        ConversionError::UnableToCopyFile
    })?;
    Ok(())
}
