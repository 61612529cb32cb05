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

//! DAT header strings written by the scanner.
//!
//! A DAT header is a single line with a fixed but undocumented grammar:
//!
//! ```text
//! [min..max]  name:CLS=c RWS=r XIN=x YIN=y VE=v TMP pwr M/D/Y H:M:S id  type  \x14 ...
//! ```
//!
//! followed by `\x14` separated fields that carry the chip type (`<chip>.1sq`),
//! the filter wavelength, arc radius, laser spot size, pixel size and image
//! orientation at fixed positions.
//!
//! [parse_scanner_header] extracts what it can from the header and skips
//! anything it cannot parse. [new_dat_name] replaces the DAT file name
//! embedded in the header.
//!
use crate::cel::calvin::{
    ARC_RADIUS_PARAM, FILTER_PARAM, LASER_SPOT_SIZE_PARAM, ORIENTATION_PARAM,
    PIXEL_COLS_PARAM, PIXEL_ROWS_PARAM, PIXEL_SIZE_PARAM, SCANNER_ID_PARAM,
    SCANNER_TYPE_PARAM, SCAN_DATE_PARAM,
};
use crate::parameter::ParameterNameValue;

pub const DELIMITER: char = '\x14';

/// Characters from `VE=` to the start of the scan date.
///
/// `VE=%-2d ` takes 6, the temperature field 7 and the laser power 4.
const VE_TO_DATE: usize = 17;

/// Number of `\x14` separated fields read after the first delimiter.
const N_CHIP_FIELDS: usize = 11;

/// DAT header that could not be rewritten.
#[derive(Debug, Clone)]
pub struct DatHeaderError {
    pub header: String,
}

impl std::fmt::Display for DatHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "unable to parse DAT header: {}", self.header)
    }
}

impl std::error::Error for DatHeaderError {}

/// Fields extracted from a DAT header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannerInfo {
    pub rows: Option<i32>,
    pub cols: Option<i32>,
    pub scan_date: Option<String>,
    pub scanner_id: Option<String>,
    pub scanner_type: Option<String>,
    pub filter: Option<i32>,
    pub arc_radius: Option<f32>,
    pub laser_spot_size: Option<f32>,
    pub pixel_size: Option<f32>,
    pub orientation: Option<u8>,
}

impl ScannerInfo {
    /// The extracted fields as scan acquisition header parameters.
    pub fn to_params(&self) -> Vec<ParameterNameValue> {
        let mut params: Vec<ParameterNameValue> = Vec::new();
        if let Some(rows) = self.rows { params.push(ParameterNameValue::int32(PIXEL_ROWS_PARAM, rows)) }
        if let Some(cols) = self.cols { params.push(ParameterNameValue::int32(PIXEL_COLS_PARAM, cols)) }
        if let Some(date) = &self.scan_date { params.push(ParameterNameValue::text(SCAN_DATE_PARAM, date)) }
        if let Some(id) = &self.scanner_id { params.push(ParameterNameValue::text(SCANNER_ID_PARAM, id)) }
        if let Some(kind) = &self.scanner_type { params.push(ParameterNameValue::text(SCANNER_TYPE_PARAM, kind)) }
        if let Some(filter) = self.filter { params.push(ParameterNameValue::int32(FILTER_PARAM, filter)) }
        if let Some(x) = self.arc_radius { params.push(ParameterNameValue::float(ARC_RADIUS_PARAM, x)) }
        if let Some(x) = self.laser_spot_size { params.push(ParameterNameValue::float(LASER_SPOT_SIZE_PARAM, x)) }
        if let Some(x) = self.pixel_size { params.push(ParameterNameValue::float(PIXEL_SIZE_PARAM, x)) }
        if let Some(x) = self.orientation { params.push(ParameterNameValue::uint8(ORIENTATION_PARAM, x)) }
        params
    }
}

/// Minimal `scanf` style cursor over a string.
struct Scan<'a> {
    rest: &'a str,
}

impl<'a> Scan<'a> {
    fn new(s: &'a str) -> Self {
        Scan { rest: s }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }

    /// Integer at the cursor. Values outside of `i32` give None.
    fn int(&mut self) -> Option<i32> {
        self.skip_ws();
        let bytes = self.rest.as_bytes();
        let sign_len = if matches!(bytes.first(), Some(b'-') | Some(b'+')) { 1 } else { 0 };
        let n_digits = bytes[sign_len..].iter().take_while(|b| b.is_ascii_digit()).count();
        if n_digits == 0 {
            return None
        }
        let value = self.rest[0..(sign_len + n_digits)].parse::<i64>().ok()
            .and_then(|x| i32::try_from(x).ok())?;
        self.rest = &self.rest[(sign_len + n_digits)..];
        Some(value)
    }

    fn float(&mut self) -> Option<f32> {
        self.skip_ws();
        let end = self.rest.char_indices()
            .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            .map(|(i, c)| i + c.len_utf8())
            .last()?;
        // longest prefix that parses
        (1..=end).rev().find_map(|n| {
            self.rest.get(0..n).and_then(|s| s.parse::<f32>().ok())
        })
    }
}

fn skip_chars(
    s: &str,
    n: usize,
) -> Option<&str> {
    match s.char_indices().nth(n) {
        Some((pos, _)) => Some(&s[pos..]),
        None if s.chars().count() == n => Some(""),
        None => None,
    }
}

/// `CLS=%d RWS=%d` at the start of `s`.
fn parse_dimensions(
    s: &str,
) -> Option<(i32, i32)> {
    let mut scan = Scan::new(s);
    scan.literal("CLS=")?;
    let first = scan.int()?;
    scan.skip_ws();
    scan.literal("RWS=")?;
    let second = scan.int()?;
    Some((first, second))
}

/// `M/D/Y H:M:S` at the start of `s`, formatted as `YYYY-MM-DDTHH:MM:SS`.
///
/// Two digit years below 90 are in the 2000s, the rest in the 1900s.
/// Dates that do not exist on the calendar give None.
fn parse_scan_date(
    s: &str,
) -> Option<String> {
    let mut scan = Scan::new(s);
    let month = scan.int()?;
    scan.literal("/")?;
    let day = scan.int()?;
    scan.literal("/")?;
    let mut year = scan.int()?;
    let hour = scan.int()?;
    scan.literal(":")?;
    let minute = scan.int()?;
    scan.literal(":")?;
    let second = scan.int()?;
    if year < 100 {
        year += if year < 90 { 2000 } else { 1900 };
    }
    let date = chrono::NaiveDate::from_ymd_opt(
        year,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    let time = date.and_hms_opt(
        u32::try_from(hour).ok()?,
        u32::try_from(minute).ok()?,
        u32::try_from(second).ok()?,
    )?;
    Some(time.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Scanner id and type from the part of the header that starts with the
/// scan date and ends before the first delimiter.
///
/// Returns None if the date and time cannot be skipped.
fn parse_scanner_fields(
    s: &str,
) -> Option<(Option<String>, Option<String>)> {
    let (_date, rest) = s.split_once(' ')?;
    let (_time, mut rest) = rest.split_once(' ')?;

    let mut scanner_id: Option<String> = None;
    if !rest.is_empty() && !rest.starts_with(' ') {
        if let Some(end) = rest.find("  ") {
            scanner_id = Some(rest[0..end].to_string());
            rest = &rest[end..];
        }
    }

    let mut scanner_type: Option<String> = None;
    if let Some(after) = skip_chars(rest, 2) {
        if !after.is_empty() && !after.starts_with(' ') {
            if let Some(end) = after.find("  ") {
                scanner_type = Some(after[0..end].to_string());
            }
        }
    }
    Some((scanner_id, scanner_type))
}

/// Splits the header after its first delimiter into trimmed positional fields.
pub fn chip_fields(
    header: &str,
) -> Vec<String> {
    match header.split_once(DELIMITER) {
        Some((_, rest)) => rest.split(DELIMITER).take(N_CHIP_FIELDS).map(|x| x.trim().to_string()).collect(),
        None => Vec::new(),
    }
}

/// Extracts scan metadata from a DAT header.
///
/// Each field that cannot be found or parsed is left empty. When the
/// scanner fields are reached but no scanner type is present,
/// `fallback_scanner_type` is used instead.
///
/// The first integer after `CLS=` is stored as the row count and the one
/// after `RWS=` as the column count.
///
/// ## Usage
///
/// ```rust
/// use celchp::cel::dat_header::parse_scanner_header;
///
/// let header = "[0..65535]  sample:CLS=100  RWS=200  XIN=3  YIN=3  VE=17        2.0 01/15/03 10:30:00 ScanID  TypeA  \x14 \x14 chip.1sq \x14 \x14 \x14 \x14 \x14 5\x14 6.2\x140.8\x1411.0\x141\x14";
/// let info = parse_scanner_header(header, None);
///
/// assert_eq!(info.rows, Some(100));
/// assert_eq!(info.cols, Some(200));
/// assert_eq!(info.scan_date.as_deref(), Some("2003-01-15T10:30:00"));
/// assert_eq!(info.scanner_id.as_deref(), Some("ScanID"));
/// assert_eq!(info.scanner_type.as_deref(), Some("TypeA"));
/// assert_eq!(info.filter, Some(5));
/// assert_eq!(info.orientation, Some(1));
/// ```
pub fn parse_scanner_header(
    header: &str,
    fallback_scanner_type: Option<&str>,
) -> ScannerInfo {
    let mut info = ScannerInfo::default();

    if let Some((_, after_colon)) = header.split_once(':') {
        if let Some((rows, cols)) = parse_dimensions(after_colon) {
            info.rows = Some(rows);
            info.cols = Some(cols);
        } else {
            log::debug!("No CLS/RWS fields in DAT header");
        }

        let date_str = after_colon.find("VE=").and_then(|pos| skip_chars(&after_colon[pos..], VE_TO_DATE));
        if let Some(date_str) = date_str {
            info.scan_date = parse_scan_date(date_str);
            if info.scan_date.is_some() {
                if let Some((scanner_str, _)) = date_str.split_once(DELIMITER) {
                    if let Some((id, kind)) = parse_scanner_fields(scanner_str) {
                        info.scanner_id = id;
                        info.scanner_type = kind.or(fallback_scanner_type.filter(|x| !x.is_empty()).map(|x| x.to_string()));
                    }
                }
            } else {
                log::debug!("Unable to parse scan date from DAT header");
            }
        }
    }

    let fields = chip_fields(header);
    let field = |i: usize| fields.get(i).map(|x| x.as_str()).filter(|x| !x.is_empty());
    let nonzero = |x: f32| if x != 0.0 { Some(x) } else { None };

    info.filter = field(6).and_then(|x| Scan::new(x).int());
    info.arc_radius = field(7).and_then(|x| Scan::new(x).float()).and_then(nonzero);
    info.laser_spot_size = field(8).and_then(|x| Scan::new(x).float()).and_then(nonzero);
    info.pixel_size = field(9).and_then(|x| Scan::new(x).float()).and_then(nonzero);
    info.orientation = field(10).and_then(|x| Scan::new(x).int()).and_then(|x| u8::try_from(x).ok());

    info
}

/// Replaces the DAT file name in `header` with `dat_name`.
///
/// The name is the text between the `]  ` that closes the pixel range and
/// the `:CLS` that starts the scan fields. Fails if either marker is
/// missing.
///
/// ## Usage
///
/// ```rust
/// use celchp::cel::dat_header::new_dat_name;
///
/// let header = "[0..46101]  old_name.dat:CLS=4733 RWS=4733";
/// let got = new_dat_name(header, "new_name").unwrap();
///
/// assert_eq!(got, "[0..46101]  new_name:CLS=4733 RWS=4733");
/// assert!(new_dat_name("no markers here", "new_name").is_err());
/// ```
pub fn new_dat_name(
    header: &str,
    dat_name: &str,
) -> Result<String, DatHeaderError> {
    let err = || DatHeaderError { header: header.to_string() };
    let start = header.find("]  ").ok_or_else(err)? + 3;
    let end = header.find(":CLS").ok_or_else(err)?;
    if end < start {
        return Err(err())
    }
    Ok(header[0..start].to_string() + dat_name + &header[end..])
}

fn chip_type_span(
    header: &str,
) -> Option<(usize, usize)> {
    let end = header.find(".1sq")?;
    let field_start = header[0..end].rfind(DELIMITER).map(|pos| pos + DELIMITER.len_utf8()).unwrap_or(0);
    let field = &header[field_start..end];
    let start = field_start + (field.len() - field.trim_start().len());
    Some((start, end))
}

/// Chip type named in the `<chip>.1sq` field, or an empty string.
pub fn chip_type_from_dat_header(
    header: &str,
) -> String {
    chip_type_span(header).map(|(start, end)| header[start..end].to_string()).unwrap_or_default()
}

/// Puts `chip_type` in the `<chip>.1sq` field of `header`.
///
/// Headers without the field are returned unchanged.
pub fn substitute_chip_type(
    header: &str,
    chip_type: &str,
) -> String {
    match chip_type_span(header) {
        Some((start, end)) => header[0..start].to_string() + chip_type + &header[end..],
        None => header.to_string(),
    }
}

/// DAT header for a file that has none.
pub fn default_dat_header(
    chip_type: &str,
) -> String {
    let mut header = format!(" {} {} {}.1sq ", DELIMITER, DELIMITER, chip_type);
    for _ in 0..9 {
        header.push(DELIMITER);
        header.push(' ');
    }
    header
}

// Tests
#[cfg(test)]
mod tests {

    const HEADER: &str = "[0..65535]  sample:CLS=100  RWS=200  XIN=3  YIN=3  VE=17        2.0 01/15/03 10:30:00 ScanID  TypeA  \x14 \x14 chip.1sq \x14 \x14 \x14 \x14 \x14 5\x14 6.2\x140.8\x1411.0\x141\x14";

    #[test]
    fn parse_full_header() {
        use super::{parse_scanner_header, ScannerInfo};

        let got = parse_scanner_header(HEADER, None);
        let expected = ScannerInfo {
            rows: Some(100),
            cols: Some(200),
            scan_date: Some("2003-01-15T10:30:00".to_string()),
            scanner_id: Some("ScanID".to_string()),
            scanner_type: Some("TypeA".to_string()),
            filter: Some(5),
            arc_radius: Some(6.2),
            laser_spot_size: Some(0.8),
            pixel_size: Some(11.0),
            orientation: Some(1),
        };

        assert_eq!(got, expected);
    }

    #[test]
    fn nineteen_hundreds() {
        use super::parse_scanner_header;

        let header = HEADER.replace("01/15/03", "12/31/98");
        let got = parse_scanner_header(&header, None);

        assert_eq!(got.scan_date.as_deref(), Some("1998-12-31T10:30:00"));
    }

    #[test]
    fn oversized_integers_are_skipped() {
        use super::parse_scanner_header;

        let header = HEADER.replace("CLS=100", "CLS=4294967396").replace("\x141\x14", "\x14257\x14");
        let got = parse_scanner_header(&header, None);

        assert_eq!(got.rows, None);
        assert_eq!(got.cols, None);
        assert_eq!(got.orientation, None);
        assert_eq!(got.filter, Some(5));
        assert_eq!(got.scan_date.as_deref(), Some("2003-01-15T10:30:00"));
    }

    #[test]
    fn impossible_scan_date() {
        use super::parse_scanner_header;

        let header = HEADER.replace("01/15/03", "02/30/03");
        let got = parse_scanner_header(&header, None);

        assert_eq!(got.scan_date, None);
        assert_eq!(got.rows, Some(100));
        assert_eq!(got.filter, Some(5));
    }

    #[test]
    fn empty_scanner_fields_use_fallback_type() {
        use super::parse_scanner_header;

        let header = HEADER.replace("ScanID  TypeA  ", "    ");
        let got = parse_scanner_header(&header, Some("M10"));

        assert_eq!(got.scanner_id, None);
        assert_eq!(got.scanner_type.as_deref(), Some("M10"));
    }

    #[test]
    fn zero_optics_are_skipped() {
        use super::parse_scanner_header;

        let header = HEADER.replace("6.2\x140.8\x1411.0", "0\x140.0\x14 ");
        let got = parse_scanner_header(&header, None);

        assert_eq!(got.arc_radius, None);
        assert_eq!(got.laser_spot_size, None);
        assert_eq!(got.pixel_size, None);
        assert_eq!(got.filter, Some(5));
        assert_eq!(got.orientation, Some(1));
    }

    #[test]
    fn no_colon_skips_scan_fields() {
        use super::parse_scanner_header;

        let got = parse_scanner_header(" \x14 \x14 chip.1sq \x14 \x14 \x14 \x14 \x14 \x14 \x14 \x14 \x14 ", None);

        assert_eq!(got.rows, None);
        assert_eq!(got.scan_date, None);
        assert_eq!(got.filter, None);
        assert!(got.to_params().is_empty());
    }

    #[test]
    fn to_params_order() {
        use super::parse_scanner_header;

        let names: Vec<String> = parse_scanner_header(HEADER, None).to_params().into_iter().map(|p| p.name).collect();

        assert_eq!(names, vec![
            "affymetrix-pixel-rows", "affymetrix-pixel-cols", "affymetrix-scan-date",
            "affymetrix-scanner-id", "affymetrix-scanner-type", "affymetrix-filter-wavelength",
            "affymetrix-arc-radius", "affymetrix-laser-spotsize", "affymetrix-pixel-size",
            "affymetrix-image-orientation",
        ]);
    }

    #[test]
    fn rename_keeps_prefix_and_suffix() {
        use super::new_dat_name;

        let got = new_dat_name(HEADER, "renamed").unwrap();

        assert!(got.starts_with("[0..65535]  renamed:CLS=100"));
        assert!(got.ends_with("1\x14"));
    }

    #[test]
    fn rename_missing_marker() {
        use super::new_dat_name;

        assert!(new_dat_name("[0..65535]  sample CLS=100", "renamed").is_err());
        assert!(new_dat_name("[0..65535] sample:CLS=100", "renamed").is_err());
    }

    #[test]
    fn chip_type_with_space() {
        use super::{chip_type_from_dat_header, default_dat_header, substitute_chip_type};

        let header = default_dat_header("chip type");

        assert_eq!(chip_type_from_dat_header(&header), "chip type");
        assert_eq!(chip_type_from_dat_header(HEADER), "chip");
        assert_eq!(chip_type_from_dat_header("no chip"), "");

        let replaced = substitute_chip_type(HEADER, "HG-U133A");
        assert_eq!(chip_type_from_dat_header(&replaced), "HG-U133A");
        assert_eq!(replaced.len(), HEADER.len() + 4);
    }
}
