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

//! Low-level building blocks shared by the file formats.
//!
//! Contains the two [bincode] configurations used by the binary formats
//! ([legacy_config] for the little-endian legacy files and
//! [container_config] for the big-endian container files), the
//! length-prefixed string types [AsciiString] and [WideString], the
//! narrow/wide character transcoding rule ([narrow] and [widen]) and
//! gzip-transparent file readers ([read_file_bytes] and [read_file_head]).
//!
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use bincode::de::read::Reader;
use bincode::de::Decoder;
use bincode::enc::write::Writer;
use bincode::enc::Encoder;
use bincode::error::DecodeError;
use bincode::error::EncodeError;
use bincode::Decode;
use bincode::Encode;

use bstr::BString;

use flate2::read::GzDecoder;

type E = Box<dyn std::error::Error>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Configuration for the little-endian legacy binary formats.
pub fn legacy_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Configuration for the big-endian generic container format.
pub fn container_config() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian().with_fixed_int_encoding()
}

fn decode_len<D: Decoder>(
    decoder: &mut D,
) -> Result<usize, DecodeError> {
    let len = i32::decode(decoder)?;
    if len < 0 {
        return Err(DecodeError::OtherString(format!("negative string length {}", len)))
    }
    Ok(len as usize)
}

const READ_CHUNK: usize = 4096;

/// Reads `len` bytes from `decoder`.
///
/// Memory grows with the bytes actually read, so a corrupt length fails
/// at the end of the input instead of allocating `len` bytes up front.
pub fn decode_bytes<D: Decoder>(
    decoder: &mut D,
    len: usize,
) -> Result<Vec<u8>, DecodeError> {
    decoder.claim_bytes_read(len)?;
    let mut bytes: Vec<u8> = Vec::with_capacity(len.min(READ_CHUNK));
    let mut chunk = [0_u8; READ_CHUNK];
    while bytes.len() < len {
        let n = (len - bytes.len()).min(READ_CHUNK);
        decoder.reader().read(&mut chunk[0..n])?;
        bytes.extend_from_slice(&chunk[0..n]);
    }
    Ok(bytes)
}

/// Narrow string stored as an `i32` length followed by the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsciiString(pub BString);

impl AsciiString {
    pub fn new(bytes: &[u8]) -> Self {
        AsciiString(BString::from(bytes))
    }
}

impl From<&str> for AsciiString {
    fn from(s: &str) -> Self {
        AsciiString(BString::from(s))
    }
}

impl Encode for AsciiString {
    fn encode<En: Encoder>(
        &self,
        encoder: &mut En,
    ) -> Result<(), EncodeError> {
        (self.0.len() as i32).encode(encoder)?;
        encoder.writer().write(self.0.as_slice())
    }
}

impl<Context> Decode<Context> for AsciiString {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let len = decode_len(decoder)?;
        Ok(AsciiString(BString::from(decode_bytes(decoder, len)?)))
    }
}
bincode::impl_borrow_decode!(AsciiString);

/// Wide string stored as an `i32` length followed by UTF-16 code units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WideString(pub String);

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        WideString(s.to_string())
    }
}

impl Encode for WideString {
    fn encode<En: Encoder>(
        &self,
        encoder: &mut En,
    ) -> Result<(), EncodeError> {
        let units: Vec<u16> = self.0.encode_utf16().collect();
        (units.len() as i32).encode(encoder)?;
        for unit in units {
            unit.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for WideString {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let len = decode_len(decoder)?;
        decoder.claim_bytes_read(len * 2)?;
        let mut units: Vec<u16> = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            units.push(u16::decode(decoder)?);
        }
        Ok(WideString(String::from_utf16_lossy(&units)))
    }
}
bincode::impl_borrow_decode!(WideString);

/// Converts a wide string to a narrow one.
///
/// Characters that fit in a single byte are kept as is, everything else
/// becomes `?`.
///
/// ## Usage
///
/// ```rust
/// use celchp::codec::narrow;
///
/// assert_eq!(narrow("Grid ä"), b"Grid \xe4".to_vec());
/// assert_eq!(narrow("µm²→"), b"\xb5m\xb2?".to_vec());
/// ```
pub fn narrow(
    s: &str,
) -> BString {
    BString::from(s.chars().map(|c| {
        let code = c as u32;
        if code <= 0xFF { code as u8 } else { b'?' }
    }).collect::<Vec<u8>>())
}

/// Converts a narrow string to a wide one, reading each byte as Latin-1.
pub fn widen(
    bytes: &[u8],
) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Reads the whole file at `path` into memory, inflating gzip input.
pub fn read_file_bytes(
    path: &Path,
) -> Result<Vec<u8>, E> {
    let mut raw: Vec<u8> = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    if raw.len() >= 2 && raw[0..2] == GZIP_MAGIC {
        let mut inflated: Vec<u8> = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
        log::debug!("Inflated gzip input {}", path.display());
        Ok(inflated)
    } else {
        Ok(raw)
    }
}

/// Bytes read from the start of a file to detect its format.
pub const SNIFF_LEN: usize = 4096;

/// Reads at most `limit` bytes from the start of the file at `path`,
/// inflating gzip input.
///
/// Enough to tell the file formats apart without reading the whole file.
pub fn read_file_head(
    path: &Path,
    limit: usize,
) -> Result<Vec<u8>, E> {
    let mut conn = BufReader::new(File::open(path)?);
    let gzipped = conn.fill_buf()?.starts_with(&GZIP_MAGIC);
    let mut head: Vec<u8> = Vec::new();
    if gzipped {
        GzDecoder::new(conn).take(limit as u64).read_to_end(&mut head)?;
    } else {
        conn.take(limit as u64).read_to_end(&mut head)?;
    }
    Ok(head)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn ascii_string_big_endian_layout() {
        use super::{container_config, AsciiString};

        let value = AsciiString::from("abc");
        let bytes = bincode::encode_to_vec(&value, container_config()).unwrap();

        assert_eq!(bytes, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn wide_string_little_endian_layout() {
        use super::{legacy_config, WideString};

        let value = WideString::from("Hi");
        let bytes = bincode::encode_to_vec(&value, legacy_config()).unwrap();

        assert_eq!(bytes, vec![2, 0, 0, 0, b'H', 0, b'i', 0]);
    }

    #[test]
    fn wide_string_decode() {
        use super::{container_config, WideString};

        let bytes: Vec<u8> = vec![0, 0, 0, 4, 0, b'C', 0, b'e', 0, b'l', 0x00, 0xb5];
        let (got, nbytes): (WideString, usize) = bincode::decode_from_slice(&bytes, container_config()).unwrap();

        assert_eq!(got.0, "Celµ");
        assert_eq!(nbytes, 12);
    }

    #[test]
    fn negative_length_is_an_error() {
        use super::{container_config, AsciiString};

        let bytes: Vec<u8> = vec![0xff, 0xff, 0xff, 0xff];
        let got: Result<(AsciiString, usize), _> = bincode::decode_from_slice(&bytes, container_config());

        assert!(got.is_err());
    }

    #[test]
    fn huge_length_fails_at_end_of_input() {
        use super::{container_config, AsciiString};

        let bytes: Vec<u8> = vec![0x7f, 0xff, 0xff, 0xff, b'a', b'b'];
        let got: Result<(AsciiString, usize), _> = bincode::decode_from_slice(&bytes, container_config());

        assert!(got.is_err());
    }

    #[test]
    fn truncated_string_is_an_error() {
        use super::{legacy_config, AsciiString};

        let bytes: Vec<u8> = vec![10, 0, 0, 0, b'a', b'b'];
        let got: Result<(AsciiString, usize), _> = bincode::decode_from_slice(&bytes, legacy_config());

        assert!(got.is_err());
    }

    #[test]
    fn widen_latin1() {
        use super::widen;

        assert_eq!(widen(b"\xb5m"), "µm");
    }

    #[test]
    fn read_gzipped_file() {
        use super::read_file_bytes;
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.CEL.gz");

        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(b"[CEL]\nVersion=3\n").unwrap();
        encoder.finish().unwrap();

        let got = read_file_bytes(&path).unwrap();
        assert_eq!(got, b"[CEL]\nVersion=3\n".to_vec());
    }

    #[test]
    fn read_plain_file() {
        use super::read_file_bytes;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.CEL");
        std::fs::write(&path, b"plain").unwrap();

        assert_eq!(read_file_bytes(&path).unwrap(), b"plain".to_vec());
    }

    #[test]
    fn read_head_of_plain_and_gzipped_files() {
        use super::read_file_head;
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("sample.CEL");
        std::fs::write(&plain, b"[CEL]\nVersion=3\n").unwrap();

        let gzipped = dir.path().join("sample.CEL.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&gzipped).unwrap(), Compression::default());
        encoder.write_all(b"[CEL]\nVersion=3\n").unwrap();
        encoder.finish().unwrap();

        assert_eq!(read_file_head(&plain, 5).unwrap(), b"[CEL]".to_vec());
        assert_eq!(read_file_head(&gzipped, 5).unwrap(), b"[CEL]".to_vec());
        assert_eq!(read_file_head(&plain, 1000).unwrap(), b"[CEL]\nVersion=3\n".to_vec());
    }
}
