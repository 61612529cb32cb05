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
use std::path::PathBuf;

use crate::cel::calvin::ARRAY_BARCODE_PARAM;
use crate::cel::calvin::ARRAY_FILE_TYPE;
use crate::cel::calvin::ARRAY_ID_PARAM;
use crate::cel::calvin::SCANNER_TYPE_PARAM;
use crate::generic::reader::read_generic_file_header;
use crate::generic::GenericDataHeader;
use crate::parameter::ParameterNameValue;

/// Settings shared by every conversion an engine runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConverterConfig {
    /// Directory with the PSI and CDF library files.
    pub library_path: PathBuf,
    /// Container file whose header becomes the parent of converted files.
    pub parent_file: Option<PathBuf>,
    /// CEL file the CHP results were computed from.
    pub parent_cel: Option<PathBuf>,
    /// Parameters added to the header of converted container files.
    pub extra_parameters: Vec<ParameterNameValue>,
    pub array_id: Option<String>,
    pub array_barcode: Option<String>,
    /// Keep `<file>.bak` after a successful in-place conversion.
    pub keep_backup: bool,
}

impl ConverterConfig {
    /// Path of library file `<chip_type>.<extension>`.
    pub fn library_file(
        &self,
        chip_type: &str,
        extension: &str,
    ) -> PathBuf {
        self.library_path.join(format!("{}.{}", chip_type, extension))
    }

    /// Scanner type given in the extra parameters.
    pub fn scanner_type(&self) -> Option<&str> {
        self.extra_parameters.iter()
            .find(|p| p.name == SCANNER_TYPE_PARAM)
            .and_then(|p| p.value_text())
    }

    /// Header of the configured parent file.
    ///
    /// Returns None if no parent file is set or it cannot be read.
    pub fn parent_header(&self) -> Option<GenericDataHeader> {
        let path: &Path = self.parent_file.as_deref()?;
        match read_generic_file_header(path) {
            Ok(header) => Some(header),
            Err(e) => {
                log::warn!("Unable to read parent file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Array header carrying the configured array id and barcode.
    pub fn array_header(&self) -> Option<GenericDataHeader> {
        let id = self.array_id.as_deref().filter(|x| !x.is_empty());
        let barcode = self.array_barcode.as_deref().filter(|x| !x.is_empty());
        if id.is_none() && barcode.is_none() {
            return None
        }
        let mut header = GenericDataHeader::new(ARRAY_FILE_TYPE);
        if let Some(id) = id { header.add_param(ParameterNameValue::text(ARRAY_ID_PARAM, id)) }
        if let Some(barcode) = barcode { header.add_param(ParameterNameValue::text(ARRAY_BARCODE_PARAM, barcode)) }
        Some(header)
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn array_header_only_when_set() {
        use super::ConverterConfig;

        let mut config = ConverterConfig::default();
        assert!(config.array_header().is_none());

        config.array_barcode = Some("52000123".to_string());
        let header = config.array_header().unwrap();
        assert_eq!(header.file_type_id, "affymetrix-calvin-array");
        assert_eq!(header.params.len(), 1);
        assert_eq!(header.find_param("affymetrix-array-barcode").and_then(|p| p.value_text()), Some("52000123"));
    }

    #[test]
    fn scanner_type_from_extra_parameters() {
        use super::ConverterConfig;
        use crate::parameter::ParameterNameValue;

        let mut config = ConverterConfig::default();
        assert_eq!(config.scanner_type(), None);

        config.extra_parameters.push(ParameterNameValue::text("affymetrix-scanner-type", "M10"));
        assert_eq!(config.scanner_type(), Some("M10"));
    }

    #[test]
    fn unreadable_parent_file() {
        use super::ConverterConfig;
        use std::path::PathBuf;

        let config = ConverterConfig { parent_file: Some(PathBuf::from("/nonexistent/parent.dat")), ..Default::default() };

        assert!(config.parent_header().is_none());
    }

    #[test]
    fn library_file_path() {
        use super::ConverterConfig;
        use std::path::PathBuf;

        let config = ConverterConfig { library_path: PathBuf::from("/lib"), ..Default::default() };

        assert_eq!(config.library_file("Test3", "CDF"), PathBuf::from("/lib/Test3.CDF"));
    }
}
