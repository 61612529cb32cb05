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

//! CEL files in the generic container format.
//!
//! The cell values are stored in one data group with five data sets:
//! `Intensity` (float), `StdDev` (float), `Pixel` (int16) and the
//! `Outlier` and `Mask` coordinate tables (int16 `X` and `Y` columns).
//! Dimensions, array type, algorithm name and algorithm parameters are
//! parameters of the file header, the algorithm parameters with the
//! [ALGORITHM_PARAM_PREFIX] prepended to their names.
//!
//! The DAT header lives in the scan acquisition parent header.
//!
use std::io::Cursor;
use std::path::Path;

use crate::codec::read_file_bytes;
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

// File type ids
pub const INTENSITY_FILE_TYPE: &str = "affymetrix-calvin-intensity";
pub const SCAN_ACQUISITION_TYPE: &str = "affymetrix-calvin-scan-acquisition";
pub const ARRAY_FILE_TYPE: &str = "affymetrix-calvin-array";

// File header parameters
pub const ALGORITHM_NAME_PARAM: &str = "affymetrix-algorithm-name";
pub const ALGORITHM_PARAM_PREFIX: &str = "affymetrix-algorithm-param-";
pub const ARRAY_TYPE_PARAM: &str = "affymetrix-array-type";
pub const CEL_ROWS_PARAM: &str = "affymetrix-cel-rows";
pub const CEL_COLS_PARAM: &str = "affymetrix-cel-cols";

// Scan acquisition parameters
pub const DAT_HEADER_PARAM: &str = "affymetrix-dat-header";
pub const PARTIAL_DAT_HEADER_PARAM: &str = "affymetrix-partial-dat-header";
pub const MAX_PIXEL_INTENSITY_PARAM: &str = "affymetrix-max-pixel-intensity";
pub const MIN_PIXEL_INTENSITY_PARAM: &str = "affymetrix-min-pixel-intensity";
pub const PIXEL_ROWS_PARAM: &str = "affymetrix-pixel-rows";
pub const PIXEL_COLS_PARAM: &str = "affymetrix-pixel-cols";
pub const SCAN_DATE_PARAM: &str = "affymetrix-scan-date";
pub const SCANNER_ID_PARAM: &str = "affymetrix-scanner-id";
pub const SCANNER_TYPE_PARAM: &str = "affymetrix-scanner-type";
pub const FILTER_PARAM: &str = "affymetrix-filter-wavelength";
pub const ARC_RADIUS_PARAM: &str = "affymetrix-arc-radius";
pub const LASER_SPOT_SIZE_PARAM: &str = "affymetrix-laser-spotsize";
pub const PIXEL_SIZE_PARAM: &str = "affymetrix-pixel-size";
pub const ORIENTATION_PARAM: &str = "affymetrix-image-orientation";

// Array parameters
pub const ARRAY_ID_PARAM: &str = "affymetrix-array-id";
pub const ARRAY_BARCODE_PARAM: &str = "affymetrix-array-barcode";

// Data group and data sets
pub const CEL_GROUP: &str = "Default Group";
pub const INTENSITY_SET: &str = "Intensity";
pub const STDEV_SET: &str = "StdDev";
pub const PIXEL_SET: &str = "Pixel";
pub const OUTLIER_SET: &str = "Outlier";
pub const MASK_SET: &str = "Mask";

/// CEL file contents in container form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalvinCel {
    pub header: GenericDataHeader,
    pub intensities: Vec<f32>,
    pub stdevs: Vec<f32>,
    pub pixels: Vec<i16>,
    pub outliers: Vec<(i16, i16)>,
    pub masked: Vec<(i16, i16)>,
}

impl CalvinCel {
    /// Creates an empty CEL with a fresh intensity file header.
    pub fn new() -> Self {
        CalvinCel { header: GenericDataHeader::new(INTENSITY_FILE_TYPE), ..Default::default() }
    }

    pub fn rows(&self) -> i32 {
        self.header.find_param(CEL_ROWS_PARAM).and_then(|p| p.value_int32()).unwrap_or(0)
    }

    pub fn cols(&self) -> i32 {
        self.header.find_param(CEL_COLS_PARAM).and_then(|p| p.value_int32()).unwrap_or(0)
    }

    pub fn n_cells(&self) -> usize {
        self.rows().max(0) as usize * self.cols().max(0) as usize
    }

    pub fn set_dimensions(
        &mut self,
        rows: i32,
        cols: i32,
    ) {
        self.header.add_param(ParameterNameValue::int32(CEL_ROWS_PARAM, rows));
        self.header.add_param(ParameterNameValue::int32(CEL_COLS_PARAM, cols));
    }

    pub fn algorithm_name(&self) -> String {
        self.header.find_param(ALGORITHM_NAME_PARAM).and_then(|p| p.value_text()).unwrap_or_default().to_string()
    }

    pub fn set_algorithm_name(
        &mut self,
        name: &str,
    ) {
        self.header.add_param(ParameterNameValue::text(ALGORITHM_NAME_PARAM, name));
    }

    pub fn array_type(&self) -> String {
        self.header.find_param(ARRAY_TYPE_PARAM).and_then(|p| p.value_text()).unwrap_or_default().to_string()
    }

    pub fn set_array_type(
        &mut self,
        array_type: &str,
    ) {
        self.header.add_param(ParameterNameValue::text(ARRAY_TYPE_PARAM, array_type));
    }

    /// Algorithm parameters in file order, with the name prefix removed.
    pub fn algorithm_params(&self) -> Vec<ParameterNameValue> {
        self.header.params.iter().filter_map(|p| {
            p.name.strip_prefix(ALGORITHM_PARAM_PREFIX)
                .map(|name| ParameterNameValue::with_value(name, p.value.clone()))
        }).collect()
    }

    pub fn find_algorithm_param(
        &self,
        name: &str,
    ) -> Option<ParameterNameValue> {
        let full_name = format!("{}{}", ALGORITHM_PARAM_PREFIX, name);
        self.header.find_param(&full_name).map(|p| ParameterNameValue::with_value(name, p.value.clone()))
    }

    /// Adds an algorithm parameter, replacing one with the same name.
    pub fn add_algorithm_param(
        &mut self,
        param: ParameterNameValue,
    ) {
        let name = format!("{}{}", ALGORITHM_PARAM_PREFIX, param.name);
        self.header.add_param(ParameterNameValue::with_value(&name, param.value));
    }

    /// DAT header of the scan acquisition parent.
    ///
    /// A parent that only has the partial DAT header gets the pixel
    /// intensity range prepended as `[min..max]`. Returns an empty
    /// string if there is no scan acquisition parent.
    pub fn dat_header(&self) -> String {
        let parent = match self.header.parents.iter().find(|p| p.file_type_id == SCAN_ACQUISITION_TYPE) {
            Some(parent) => parent,
            None => return String::new(),
        };
        if let Some(full) = parent.find_param(DAT_HEADER_PARAM) {
            return full.value_text().unwrap_or_default().to_string()
        }
        match parent.find_param(PARTIAL_DAT_HEADER_PARAM).and_then(|p| p.value_text()) {
            Some(partial) => {
                let range = |name: &str| parent.find_param(name).and_then(|p| p.value_uint16()).unwrap_or(0);
                format!("[{}..{}]{}", range(MIN_PIXEL_INTENSITY_PARAM), range(MAX_PIXEL_INTENSITY_PARAM), partial)
            },
            None => String::new(),
        }
    }

    /// Lays the contents out as container data groups.
    pub fn to_generic(&self) -> GenericData {
        let mut data = GenericData::new(self.header.clone());

        let mut intensity = DataSet::new(INTENSITY_SET);
        intensity.add_column(INTENSITY_SET, ColumnData::Float(self.intensities.clone()));
        let mut stdev = DataSet::new(STDEV_SET);
        stdev.add_column(STDEV_SET, ColumnData::Float(self.stdevs.clone()));
        let mut pixel = DataSet::new(PIXEL_SET);
        pixel.add_column(PIXEL_SET, ColumnData::Int16(self.pixels.clone()));

        let coord_set = |name: &str, coords: &[(i16, i16)]| {
            let mut set = DataSet::new(name);
            set.add_column("X", ColumnData::Int16(coords.iter().map(|(x, _)| *x).collect()));
            set.add_column("Y", ColumnData::Int16(coords.iter().map(|(_, y)| *y).collect()));
            set
        };

        let mut group = DataGroup::new(CEL_GROUP);
        group.data_sets = vec![intensity, stdev, pixel, coord_set(OUTLIER_SET, &self.outliers), coord_set(MASK_SET, &self.masked)];
        data.groups.push(group);
        data
    }

    /// Reads the contents back from container data groups.
    ///
    /// Missing standard deviation and pixel count sets are filled with
    /// zeros, missing coordinate sets are empty.
    pub fn from_generic(
        data: GenericData,
    ) -> Result<Self, E> {
        if data.header.file_type_id != INTENSITY_FILE_TYPE {
            return Err(Box::new(FormatError{ what: format!("file type {} is not {}", data.header.file_type_id, INTENSITY_FILE_TYPE) }))
        }

        let mut cel = CalvinCel { header: data.header.clone(), ..Default::default() };
        let n_cells = cel.n_cells();

        cel.intensities = match data.data_set(CEL_GROUP, INTENSITY_SET).and_then(|s| s.column_at(0)) {
            Some(ColumnData::Float(x)) => x.clone(),
            _ => return Err(Box::new(FormatError{ what: "no float Intensity data set".to_string() })),
        };
        if cel.intensities.len() != n_cells {
            return Err(Box::new(FormatError{ what: format!("{} intensities in a {}x{} array", cel.intensities.len(), cel.rows(), cel.cols()) }))
        }
        cel.stdevs = match data.data_set(CEL_GROUP, STDEV_SET).and_then(|s| s.column_at(0)) {
            Some(ColumnData::Float(x)) if x.len() == n_cells => x.clone(),
            _ => vec![0.0; n_cells],
        };
        cel.pixels = match data.data_set(CEL_GROUP, PIXEL_SET).and_then(|s| s.column_at(0)) {
            Some(ColumnData::Int16(x)) if x.len() == n_cells => x.clone(),
            _ => vec![0; n_cells],
        };

        let coords = |name: &str| -> Vec<(i16, i16)> {
            let set = data.data_set(CEL_GROUP, name);
            match (set.and_then(|s| s.column("X")), set.and_then(|s| s.column("Y"))) {
                (Some(ColumnData::Int16(x)), Some(ColumnData::Int16(y))) => x.iter().zip(y.iter()).map(|(x, y)| (*x, *y)).collect(),
                _ => Vec::new(),
            }
        };
        cel.outliers = coords(OUTLIER_SET);
        cel.masked = coords(MASK_SET);

        Ok(cel)
    }
}

/// Checks whether `bytes` starts with the header of a container CEL file.
pub fn is_calvin_cel(
    bytes: &[u8],
) -> bool {
    container_file_type(bytes).is_some_and(|x| x == INTENSITY_FILE_TYPE)
}

/// Reads the container CEL file at `path`.
pub fn read_calvin_cel(
    path: &Path,
) -> Result<CalvinCel, E> {
    let bytes = read_file_bytes(path)?;
    let data = read_generic(&mut Cursor::new(bytes))?;
    CalvinCel::from_generic(data)
}

/// Writes `cel` to `path` as a container file.
pub fn write_calvin_cel(
    cel: &CalvinCel,
    path: &Path,
) -> Result<(), E> {
    write_generic_file(&cel.to_generic(), path)?;
    Ok(())
}
