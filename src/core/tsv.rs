// Tab separated record files: typed fields over the lexer, one record per line.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::core::channel::ChannelOptions;
use crate::core::charset::Charset;
use crate::core::data::{DataSink, DataSource};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::lexer::{LexemeKind, Lexer};
use crate::core::source::Seekable;
use crate::core::tell::{LexerMark, Tell, TellValue};

const RECORD_DELIMITER: char = '\n';
const VALUE_DELIMITER: char = '\t';
const CONTEXT_BYTES: usize = 64;
// Largest magnitude below which every integral f64 is exact.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

pub struct TsvSource {
    lexer: Lexer,
    column: u32,
    // The lexer holds a lexeme that has not been consumed yet.
    pending: bool,
}

impl TsvSource {
    pub fn open(path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        Self::open_with(path, ChannelOptions::new(charset))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ChannelOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("not a readable file")
                .with_path(path));
        }
        Self::from_lexer(Lexer::open_with(path, options)?)
    }

    pub fn from_lexer(mut lexer: Lexer) -> Result<Self> {
        lexer.set_delimiter_matcher(|c| c == RECORD_DELIMITER || c == VALUE_DELIMITER);
        lexer.set_whitespace_matcher(|_| false);
        let pending = lexer.has_next();
        if pending {
            lexer.advance()?;
        }
        Ok(Self {
            lexer,
            column: 0,
            pending,
        })
    }

    pub fn path(&self) -> &Path {
        self.lexer.channel().path()
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn percent_read(&self) -> f64 {
        let total = self.lexer.bytes_total();
        if total == 0 {
            return 100.0;
        }
        100.0 * self.lexer.bytes_read() as f64 / total as f64
    }

    fn step(&mut self) -> Result<()> {
        self.pending = self.lexer.has_next();
        if self.pending {
            self.lexer.advance()?;
        }
        Ok(())
    }

    fn parse_delimiter(&mut self, expected: char) -> Result<()> {
        if !self.pending {
            return Err(self.format_error(
                format!("expecting delimiter {expected:?} but found end of input"),
                self.lexer.bytes_total(),
            ));
        }
        if self.lexer.kind() != LexemeKind::Delimiter {
            return Err(self.format_error(
                format!("expecting delimiter {expected:?} but found {:?}", self.lexer.value()),
                self.lexer.lexeme_byte_offset(),
            ));
        }
        let found = self.lexer.char_at(0)?;
        if found != expected {
            return Err(self.format_error(
                format!("expecting delimiter {expected:?} but found {found:?}"),
                self.lexer.lexeme_byte_offset(),
            ));
        }
        self.step()
    }

    /// Read the next field text and the byte offset it started at.
    fn read_value(&mut self) -> Result<(String, u64)> {
        if self.column == 0 && !self.pending {
            return Err(Error::exhausted("no more records").with_path(self.path()));
        }
        if self.column > 0 {
            self.parse_delimiter(VALUE_DELIMITER)?;
        }
        let offset = self.lexer.lexeme_byte_offset();
        let value = if self.pending && self.lexer.kind() == LexemeKind::Value {
            let value = self.lexer.value();
            self.step()?;
            value
        } else {
            // Empty field: the next delimiter stays for the following read.
            String::new()
        };
        self.column += 1;
        Ok((value, offset))
    }

    fn read_parsed<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let (text, offset) = self.read_value()?;
        text.parse::<T>().map_err(|_| {
            self.field_error(format!("cannot parse {text:?} as {what}"), offset)
        })
    }

    fn format_error(&self, message: String, offset: u64) -> Error {
        Error::format(message)
            .with_path(self.path())
            .with_offset(offset)
            .with_column(u64::from(self.column))
            .with_context(self.context_at(offset))
    }

    // For a field that was already consumed: report the column it came from.
    fn field_error(&self, message: String, offset: u64) -> Error {
        self.format_error(message, offset)
            .with_column(u64::from(self.column.saturating_sub(1)))
    }

    // Best effort: the raw bytes around `offset`, decoded lossily.
    fn context_at(&self, offset: u64) -> String {
        let from = offset.saturating_sub((CONTEXT_BYTES / 2) as u64);
        let channel = self.lexer.channel();
        channel
            .read_bytes_at(from, CONTEXT_BYTES)
            .map(|bytes| channel.charset().decode_lossy(&bytes))
            .unwrap_or_default()
    }
}

impl DataSource for TsvSource {
    fn read_byte(&mut self) -> Result<i8> {
        self.read_parsed("byte")
    }

    fn read_char(&mut self) -> Result<char> {
        let (text, offset) = self.read_value()?;
        text.parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.field_error(format!("cannot parse {text:?} as char"), offset))
    }

    fn read_short(&mut self) -> Result<i16> {
        self.read_parsed("short")
    }

    fn read_int(&mut self) -> Result<i32> {
        self.read_parsed("int")
    }

    fn read_long(&mut self) -> Result<i64> {
        self.read_parsed("long")
    }

    fn read_float(&mut self) -> Result<f32> {
        self.read_parsed("float")
    }

    fn read_double(&mut self) -> Result<f64> {
        self.read_parsed("double")
    }

    fn read_string(&mut self) -> Result<String> {
        Ok(self.read_value()?.0)
    }

    fn end_of_record(&mut self) -> Result<()> {
        if !self.pending {
            if self.column == 0 {
                return Err(Error::exhausted("no more records").with_path(self.path()));
            }
            // A final record may end at end of input without a newline.
            self.column = 0;
            return Ok(());
        }
        self.parse_delimiter(RECORD_DELIMITER)?;
        self.column = 0;
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        if !self.pending {
            return Ok(self.column > 0);
        }
        Ok(self.lexer.kind() == LexemeKind::Delimiter && self.lexer.char_at(0)? == RECORD_DELIMITER)
    }

    fn can_read(&mut self) -> Result<bool> {
        Ok(self.pending || self.column > 0)
    }

    fn close(&mut self) -> Result<()> {
        self.lexer.close()
    }
}

impl Seekable for TsvSource {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        let lexer = if self.pending {
            self.lexer.position()?
        } else {
            Tell::new(TellValue::Lexer(LexerMark {
                channel_offset: self.lexer.bytes_total(),
                buffer_offset: 0,
                char_offset: self.lexer.end(),
            }))
        };
        Ok(lexer.push(TellValue::Column(self.column)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let (column, inner) = position.pop_column()?;
        self.lexer.set_position(inner)?;
        self.pending = self.lexer.has_current();
        self.column = column;
        Ok(())
    }
}

pub struct TsvSink {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    charset: Charset,
    column: u32,
    scratch: Vec<u8>,
}

impl TsvSink {
    pub fn create(path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|err| Error::io(err, &path))?;
        debug!(path = %path.display(), %charset, "opened tsv sink");
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            charset,
            column: 0,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| Error::closed("tsv sink is closed").with_path(&self.path))?;
        self.scratch.clear();
        self.charset.encode(text, &mut self.scratch);
        out.write_all(&self.scratch)
            .map_err(|err| Error::io(err, &self.path))
    }

    fn write_field_text(&mut self, text: &str) -> Result<()> {
        if text.contains([VALUE_DELIMITER, RECORD_DELIMITER]) {
            return Err(Error::usage(format!(
                "tsv field {text:?} contains a tab or newline"
            )));
        }
        if self.column > 0 {
            self.write_text("\t")?;
        }
        self.write_text(text)?;
        self.column += 1;
        Ok(())
    }
}

fn format_double(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < EXACT_INTEGER_LIMIT {
        return format!("{}", value as i64);
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let mut text = format!("{value:.6}");
    while text.ends_with('0') && !text.ends_with(".0") {
        text.pop();
    }
    text
}

impl DataSink for TsvSink {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        self.write_field_text(&value.to_string())
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        self.write_field_text(&u32::from(value).to_string())
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        self.write_field_text(&value.to_string())
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_field_text(&value.to_string())
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        self.write_field_text(&value.to_string())
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_field_text(&value.to_string())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_field_text(&format_double(value))
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_field_text(value)
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.write_text("\n")?;
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.out.as_mut() {
            Some(out) => out.flush().map_err(|err| Error::io(err, &self.path)),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        out.flush().map_err(|err| Error::io(err, &self.path))?;
        debug!(path = %self.path.display(), "closed tsv sink");
        Ok(())
    }
}
