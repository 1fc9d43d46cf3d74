//! Purpose: Byte <-> char conversion for the supported charsets, with configurable error actions.
//! Exports: `Charset`, `CodingErrorAction`, `DecodeOptions`.
//! Role: Decode step used by the channel and encode step used by the writers.
//! Invariants: `decode` never consumes a truncated multi-byte sequence unless told the input ends.
//! Invariants: With `Replace` or `Ignore` decoding never fails; only `Report` surfaces `Corrupt`.
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
    Windows1252,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodingErrorAction {
    Replace,
    Ignore,
    Report,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodeOptions {
    pub malformed: CodingErrorAction,
    pub unmappable: CodingErrorAction,
    pub replacement: char,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self {
            malformed: CodingErrorAction::Replace,
            unmappable: CodingErrorAction::Replace,
            replacement: char::REPLACEMENT_CHARACTER,
        }
    }

    /// Report every coding error instead of substituting.
    pub fn strict() -> Self {
        Self::new()
            .with_malformed(CodingErrorAction::Report)
            .with_unmappable(CodingErrorAction::Report)
    }

    pub fn with_malformed(mut self, action: CodingErrorAction) -> Self {
        self.malformed = action;
        self
    }

    pub fn with_unmappable(mut self, action: CodingErrorAction) -> Self {
        self.unmappable = action;
        self
    }

    pub fn with_replacement(mut self, replacement: char) -> Self {
        self.replacement = replacement;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// windows-1252 code points for 0x80..=0x9F; None marks the five undefined bytes.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

enum ByteClass {
    Char(char),
    Malformed,
    Unmappable,
}

#[derive(Clone, Copy)]
enum CodingError {
    Malformed,
    Unmappable,
}

impl Charset {
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
            Charset::Windows1252 => "windows-1252",
        }
    }

    /// Widest encoding of a single character, in bytes.
    pub fn max_bytes_per_char(&self) -> usize {
        match self {
            Charset::Utf8 => 4,
            _ => 1,
        }
    }

    pub fn encoded_len(&self, c: char) -> usize {
        match self {
            Charset::Utf8 => c.len_utf8(),
            _ => 1,
        }
    }

    /// Decode from `src` into `dst`, returning `(bytes consumed, chars produced)`.
    ///
    /// Stops when `dst` is full, `src` is used up, or `src` ends inside a
    /// multi-byte sequence and `at_eof` is false. `base_offset` is the byte
    /// offset of `src[0]`, used for `Report` errors.
    pub fn decode(
        &self,
        src: &[u8],
        at_eof: bool,
        dst: &mut [char],
        options: &DecodeOptions,
        base_offset: u64,
    ) -> Result<(usize, usize)> {
        match self {
            Charset::Utf8 => decode_utf8(src, at_eof, dst, options, base_offset),
            _ => self.decode_single_byte(src, dst, options, base_offset),
        }
    }

    pub fn encode(&self, text: &str, out: &mut Vec<u8>) {
        match self {
            Charset::Utf8 => out.extend_from_slice(text.as_bytes()),
            _ => out.extend(text.chars().map(|c| self.encode_single_byte(c))),
        }
    }

    /// Lossy decode of a whole byte slice, for diagnostics.
    pub fn decode_lossy(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            _ => bytes
                .iter()
                .map(|&b| match self.classify(b) {
                    ByteClass::Char(c) => c,
                    _ => char::REPLACEMENT_CHARACTER,
                })
                .collect(),
        }
    }

    fn classify(&self, b: u8) -> ByteClass {
        match self {
            Charset::Utf8 | Charset::Ascii if b >= 0x80 => ByteClass::Malformed,
            Charset::Windows1252 if (0x80..0xA0).contains(&b) => {
                match WINDOWS_1252_HIGH[(b - 0x80) as usize] {
                    Some(c) => ByteClass::Char(c),
                    None => ByteClass::Unmappable,
                }
            }
            _ => ByteClass::Char(b as char),
        }
    }

    fn encode_single_byte(&self, c: char) -> u8 {
        let code = c as u32;
        match self {
            Charset::Ascii if code < 0x80 => code as u8,
            Charset::Latin1 if code < 0x100 => code as u8,
            Charset::Windows1252 if code < 0x80 || (0xA0..0x100).contains(&code) => code as u8,
            Charset::Windows1252 => WINDOWS_1252_HIGH
                .iter()
                .position(|entry| *entry == Some(c))
                .map_or(b'?', |index| 0x80 + index as u8),
            _ => b'?',
        }
    }

    fn decode_single_byte(
        &self,
        src: &[u8],
        dst: &mut [char],
        options: &DecodeOptions,
        base_offset: u64,
    ) -> Result<(usize, usize)> {
        let mut read = 0;
        let mut written = 0;
        while read < src.len() && written < dst.len() {
            let offset = base_offset + read as u64;
            match self.classify(src[read]) {
                ByteClass::Char(c) => {
                    dst[written] = c;
                    written += 1;
                }
                ByteClass::Malformed => {
                    if let Some(c) = resolve(CodingError::Malformed, options, *self, offset)? {
                        dst[written] = c;
                        written += 1;
                    }
                }
                ByteClass::Unmappable => {
                    if let Some(c) = resolve(CodingError::Unmappable, options, *self, offset)? {
                        dst[written] = c;
                        written += 1;
                    }
                }
            }
            read += 1;
        }
        Ok((read, written))
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            "windows-1252" | "cp1252" => Ok(Charset::Windows1252),
            _ => Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("unsupported charset {label:?}"))),
        }
    }
}

/// Apply the configured action; `Ok(None)` means the input is dropped.
fn resolve(
    error: CodingError,
    options: &DecodeOptions,
    charset: Charset,
    offset: u64,
) -> Result<Option<char>> {
    let action = match error {
        CodingError::Malformed => options.malformed,
        CodingError::Unmappable => options.unmappable,
    };
    match action {
        CodingErrorAction::Replace => Ok(Some(options.replacement)),
        CodingErrorAction::Ignore => Ok(None),
        CodingErrorAction::Report => {
            let what = match error {
                CodingError::Malformed => "malformed input",
                CodingError::Unmappable => "unmappable character",
            };
            Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("{what} for charset {charset}"))
                .with_offset(offset))
        }
    }
}

fn decode_utf8(
    src: &[u8],
    at_eof: bool,
    dst: &mut [char],
    options: &DecodeOptions,
    base_offset: u64,
) -> Result<(usize, usize)> {
    let mut read = 0;
    let mut written = 0;
    while read < src.len() && written < dst.len() {
        // Validate a bounded chunk so each call costs O(room), not O(window).
        let room = dst.len() - written;
        let end = src.len().min(read + room.saturating_mul(4));
        let chunk = &src[read..end];
        let (valid, failure) = match std::str::from_utf8(chunk) {
            Ok(text) => (text, None),
            Err(err) => (
                std::str::from_utf8(&chunk[..err.valid_up_to()]).unwrap_or_default(),
                Some(err.error_len()),
            ),
        };

        for c in valid.chars() {
            if written == dst.len() {
                return Ok((read, written));
            }
            dst[written] = c;
            written += 1;
            read += c.len_utf8();
        }

        match failure {
            None => {}
            Some(Some(len)) => {
                if written == dst.len() {
                    break;
                }
                let offset = base_offset + read as u64;
                if let Some(c) = resolve(CodingError::Malformed, options, Charset::Utf8, offset)? {
                    dst[written] = c;
                    written += 1;
                }
                read += len;
            }
            Some(None) if end < src.len() => {}
            Some(None) if at_eof => {
                if written == dst.len() {
                    break;
                }
                let offset = base_offset + read as u64;
                if let Some(c) = resolve(CodingError::Malformed, options, Charset::Utf8, offset)? {
                    dst[written] = c;
                    written += 1;
                }
                read = src.len();
            }
            Some(None) => break,
        }
    }
    Ok((read, written))
}
