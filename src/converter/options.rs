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
use crate::cel::dat_header::new_dat_name;
use crate::cel::dat_header::DatHeaderError;

/// Overrides applied while converting a CEL file.
///
/// A field that is None leaves the value in the input unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CelConversionOptions {
    pub chip_type: Option<String>,
    pub dat_file_name: Option<String>,
}

impl CelConversionOptions {
    /// Chip type to write, given the chip type of the input.
    pub fn chip_type_or<'a>(
        &'a self,
        input: &'a str,
    ) -> &'a str {
        self.chip_type.as_deref().unwrap_or(input)
    }

    /// DAT header to write, given the DAT header of the input.
    ///
    /// Fails if the DAT file name is overridden and `header` has no file
    /// name field.
    pub fn dat_header(
        &self,
        header: &str,
    ) -> Result<String, DatHeaderError> {
        match &self.dat_file_name {
            Some(name) => new_dat_name(header, name),
            None => Ok(header.to_string()),
        }
    }
}

/// Overrides applied while converting a CHP file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChpConversionOptions {
    pub chip_type: Option<String>,
}

impl ChpConversionOptions {
    pub fn chip_type_or<'a>(
        &'a self,
        input: &'a str,
    ) -> &'a str {
        self.chip_type.as_deref().unwrap_or(input)
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn cel_overrides() {
        use super::CelConversionOptions;

        let none = CelConversionOptions::default();
        assert_eq!(none.chip_type_or("Test3"), "Test3");
        assert_eq!(none.dat_header("anything").unwrap(), "anything");

        let some = CelConversionOptions { chip_type: Some("HG-U133A".to_string()), dat_file_name: Some("new".to_string()) };
        assert_eq!(some.chip_type_or("Test3"), "HG-U133A");
        assert_eq!(some.dat_header("[0..1]  old:CLS=1").unwrap(), "[0..1]  new:CLS=1");
        assert!(some.dat_header("anything").is_err());
    }
}
