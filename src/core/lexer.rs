//! Purpose: Split a decoded character stream into delimiter, whitespace and value lexemes.
//! Exports: `Lexer`, `LexemeKind`, `INITIAL_BUFFER_SIZE`.
//! Role: Bottom seekable layer of the text formats; positions are `Tell::Lexer` marks.
//! Invariants: `buffer[start..limit]` holds the current lexeme and every undecoded-but-unread char.
//! Invariants: `start()`/`end()` are logical char offsets, unchanged by compaction, growth or seek.
use std::path::Path;

use tracing::trace;

use crate::core::channel::{CharFileChannel, ChannelOptions};
use crate::core::charset::Charset;
use crate::core::error::{Error, Result};
use crate::core::source::Seekable;
use crate::core::tell::{LexerMark, Tell, TellValue};

pub const INITIAL_BUFFER_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LexemeKind {
    Delimiter,
    Whitespace,
    Value,
}

type Matcher = Box<dyn Fn(char) -> bool>;

pub struct Lexer {
    channel: CharFileChannel,
    delimiter: Matcher,
    whitespace: Matcher,
    buffer: Vec<char>,
    limit: usize,
    pos: usize,
    start: usize,
    end: usize,
    kind: LexemeKind,
    current: bool,
    // logical char offset of buffer[0]
    char_buffer_offset: u64,
    // buffer index and channel offset where the latest channel read began
    restart_index: usize,
    channel_restart_offset: u64,
    mark: LexerMark,
}

impl Lexer {
    pub fn open(path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        Ok(Self::new(CharFileChannel::open(path, charset)?))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ChannelOptions) -> Result<Self> {
        Ok(Self::new(CharFileChannel::open_with(path, options)?))
    }

    /// The lexer starts before the first lexeme; call `advance` to read it.
    pub fn new(channel: CharFileChannel) -> Self {
        let channel_restart_offset = channel.position();
        Self {
            channel,
            delimiter: Box::new(|_| false),
            whitespace: Box::new(char::is_whitespace),
            buffer: vec!['\0'; INITIAL_BUFFER_SIZE],
            limit: 0,
            pos: 0,
            start: 0,
            end: 0,
            kind: LexemeKind::Whitespace,
            current: false,
            char_buffer_offset: 0,
            restart_index: 0,
            channel_restart_offset,
            mark: LexerMark {
                channel_offset: channel_restart_offset,
                buffer_offset: 0,
                char_offset: 0,
            },
        }
    }

    pub fn set_delimiter_matcher(&mut self, matcher: impl Fn(char) -> bool + 'static) {
        self.delimiter = Box::new(matcher);
    }

    pub fn set_whitespace_matcher(&mut self, matcher: impl Fn(char) -> bool + 'static) {
        self.whitespace = Box::new(matcher);
    }

    pub fn channel(&self) -> &CharFileChannel {
        &self.channel
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.limit || self.channel.has_bytes_remaining()
    }

    pub fn advance(&mut self) -> Result<()> {
        if !self.has_next() {
            return Err(Error::exhausted("lexer has no more lexemes").with_path(self.channel.path()));
        }
        self.mark = LexerMark {
            channel_offset: self.channel_restart_offset,
            buffer_offset: self.pos - self.restart_index,
            char_offset: self.char_buffer_offset + self.pos as u64,
        };
        self.start = self.pos;
        self.end = self.pos;
        self.current = true;

        self.ensure_remaining(1)?;
        if self.pos == self.limit {
            // Every remaining byte decoded to nothing.
            self.kind = LexemeKind::Whitespace;
            self.end = self.pos;
            return Ok(());
        }

        let first = self.buffer[self.pos];
        self.pos += 1;
        if (self.delimiter)(first) {
            self.kind = LexemeKind::Delimiter;
        } else {
            let whitespace = (self.whitespace)(first);
            self.kind = if whitespace {
                LexemeKind::Whitespace
            } else {
                LexemeKind::Value
            };
            loop {
                self.ensure_remaining(1)?;
                if self.pos == self.limit {
                    break;
                }
                let c = self.buffer[self.pos];
                if (self.delimiter)(c) || (self.whitespace)(c) != whitespace {
                    break;
                }
                self.pos += 1;
            }
        }
        self.end = self.pos;
        Ok(())
    }

    pub fn advance_if_possible(&mut self) -> Result<()> {
        if self.has_next() {
            self.advance()?;
        }
        Ok(())
    }

    /// False before the first `advance` and after seeking to the end of input.
    pub fn has_current(&self) -> bool {
        self.current
    }

    pub fn kind(&self) -> LexemeKind {
        self.kind
    }

    pub fn start(&self) -> u64 {
        self.char_buffer_offset + self.start as u64
    }

    pub fn end(&self) -> u64 {
        self.char_buffer_offset + self.end as u64
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn value(&self) -> String {
        self.buffer[self.start..self.end].iter().collect()
    }

    /// Character at `offset` from the start of the current lexeme.
    pub fn char_at(&self, offset: usize) -> Result<char> {
        if offset >= self.len() {
            return Err(Error::usage(format!(
                "offset {offset} is outside a lexeme of length {}",
                self.len()
            )));
        }
        Ok(self.buffer[self.start + offset])
    }

    /// The line around the current lexeme, limited to what is still buffered.
    pub fn debug_context(&self) -> String {
        let mut from = self.start;
        while from > 0 && self.buffer[from - 1] != '\n' {
            from -= 1;
        }
        let mut to = self.end;
        while to < self.limit && self.buffer[to] != '\n' {
            to += 1;
        }
        self.buffer[from..to].iter().collect()
    }

    pub fn bytes_read(&self) -> u64 {
        self.channel.position()
    }

    pub fn bytes_total(&self) -> u64 {
        self.channel.size()
    }

    /// Byte offset of the current lexeme start; exact when the input decodes cleanly.
    pub fn lexeme_byte_offset(&self) -> u64 {
        let charset = self.channel.charset();
        let width = |chars: &[char]| -> u64 {
            chars.iter().map(|&c| charset.encoded_len(c) as u64).sum()
        };
        if self.start >= self.restart_index {
            self.channel_restart_offset + width(&self.buffer[self.restart_index..self.start])
        } else {
            self.channel_restart_offset
                .saturating_sub(width(&self.buffer[self.start..self.restart_index]))
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.channel.close()
    }

    /// Make at least `required` unread chars available unless the channel runs dry.
    /// New chars are always appended at `limit`, so callers ask only when `pos == limit`.
    fn ensure_remaining(&mut self, required: usize) -> Result<()> {
        let remaining = self.limit - self.pos;
        if required <= remaining || !self.channel.has_bytes_remaining() {
            return Ok(());
        }

        let capacity = self.buffer.len();
        let available = self.start + remaining + (capacity - self.limit);
        if available < required {
            let grown = (2 * capacity + 1).max(capacity + required - available);
            let mut buffer = vec!['\0'; grown];
            buffer[..self.limit - self.start].copy_from_slice(&self.buffer[self.start..self.limit]);
            self.buffer = buffer;
            trace!(from = capacity, to = grown, "grew lexer buffer");
        } else if self.start > 0 {
            self.buffer.copy_within(self.start..self.limit, 0);
        }

        self.limit -= self.start;
        self.pos -= self.start;
        self.end = self.end.saturating_sub(self.start);
        self.char_buffer_offset += self.start as u64;
        self.start = 0;

        self.restart_index = self.limit;
        self.channel_restart_offset = self.channel.position();
        let decoded = self.channel.read(&mut self.buffer[self.limit..])?;
        self.limit += decoded;
        Ok(())
    }
}

impl Seekable for Lexer {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(Tell::new(TellValue::Lexer(self.mark)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let mark = position.into_lexer()?;
        let char_buffer_offset = mark
            .char_offset
            .checked_sub(mark.buffer_offset as u64)
            .ok_or_else(|| Error::usage("lexer mark char offset precedes its buffer offset"))?;

        // Every decoded char consumes at least one byte.
        let decodable = self.channel.size().checked_sub(mark.channel_offset);
        if decodable.is_none_or(|bytes| mark.buffer_offset as u64 > bytes) {
            return Err(Error::usage(format!(
                "lexer mark at byte {} char {} lies outside a {} byte file",
                mark.channel_offset,
                mark.buffer_offset,
                self.channel.size()
            ))
            .with_path(self.channel.path()));
        }

        self.channel.set_position(mark.channel_offset)?;
        if self.buffer.len() <= mark.buffer_offset {
            self.buffer = vec!['\0'; mark.buffer_offset + INITIAL_BUFFER_SIZE];
        }
        self.restart_index = 0;
        self.channel_restart_offset = mark.channel_offset;
        self.limit = self.channel.read(&mut self.buffer)?;
        if mark.buffer_offset > self.limit {
            return Err(Error::usage(format!(
                "lexer mark points {} chars past byte {}, only {} decode there",
                mark.buffer_offset, mark.channel_offset, self.limit
            ))
            .with_path(self.channel.path()));
        }

        self.char_buffer_offset = char_buffer_offset;
        self.pos = mark.buffer_offset;
        self.start = self.pos;
        self.end = self.pos;
        self.mark = mark;
        self.current = false;
        self.advance_if_possible()
    }
}

#[cfg(test)]
mod tests {
    use super::{LexemeKind, Lexer, INITIAL_BUFFER_SIZE};
    use crate::core::channel::ChannelOptions;
    use crate::core::charset::Charset;
    use crate::core::error::ErrorKind;
    use crate::core::source::Seekable;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const CFB: &str = "come friendly bombs\nand fall on slough.";

    fn cfb_lexer(path: &Path) -> Lexer {
        fs::write(path, CFB).expect("write");
        let mut lexer = Lexer::open(path, Charset::Utf8).expect("open");
        lexer.set_delimiter_matcher(|c| c == '.');
        lexer
    }

    #[test]
    fn classifies_and_spans_lexemes() {
        use LexemeKind::{Delimiter as D, Value as V, Whitespace as W};
        let dir = tempdir().expect("tempdir");
        let mut lexer = cfb_lexer(&dir.path().join("cfb.txt"));

        let kinds = [V, W, V, W, V, W, V, W, V, W, V, W, V, D];
        let starts = [0, 4, 5, 13, 14, 19, 20, 23, 24, 28, 29, 31, 32, 38];
        let ends = [4, 5, 13, 14, 19, 20, 23, 24, 28, 29, 31, 32, 38, 39];
        let values = [
            "come", " ", "friendly", " ", "bombs", "\n", "and", " ", "fall", " ", "on", " ",
            "slough", ".",
        ];

        for i in 0..kinds.len() {
            assert!(lexer.has_next(), "lexeme {i}");
            lexer.advance().expect("advance");
            assert_eq!(lexer.kind(), kinds[i], "kind of {i}");
            assert_eq!(lexer.start(), starts[i], "start of {i}");
            assert_eq!(lexer.end(), ends[i], "end of {i}");
            assert_eq!(lexer.value(), values[i], "value of {i}");
        }
        assert!(!lexer.has_next());
        assert_eq!(lexer.advance().expect_err("done").kind(), ErrorKind::Exhausted);
        lexer.advance_if_possible().expect("no-op at end");
    }

    #[test]
    fn seeks_back_to_any_captured_lexeme() {
        let dir = tempdir().expect("tempdir");
        let mut lexer = cfb_lexer(&dir.path().join("cfb.txt"));

        let mut tells = Vec::new();
        let mut seen = Vec::new();
        while lexer.has_next() {
            lexer.advance().expect("advance");
            tells.push(lexer.position().expect("tell"));
            seen.push((lexer.kind(), lexer.value(), lexer.start()));
        }

        let n = tells.len();
        for step in 0..n * 3 {
            let i = (step * 7 + 3) % n;
            lexer.set_position(tells[i].clone()).expect("seek");
            assert_eq!(
                (lexer.kind(), lexer.value(), lexer.start()),
                seen[i],
                "lexeme {i}"
            );
        }
    }

    #[test]
    fn long_values_grow_the_buffer_and_keep_offsets() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("long.txt");
        let long = "x".repeat(INITIAL_BUFFER_SIZE * 3 + 5);
        fs::write(&path, format!("a {long} b")).expect("write");

        let options = ChannelOptions::new(Charset::Utf8).with_max_mapped_bytes(16);
        let mut lexer = Lexer::open_with(&path, options).expect("open");
        lexer.advance().expect("a");
        lexer.advance().expect("space");
        lexer.advance().expect("long");
        let tell = lexer.position().expect("tell");
        assert_eq!(lexer.value(), long);
        assert_eq!(lexer.start(), 2);
        lexer.advance().expect("space");
        lexer.advance().expect("b");
        assert_eq!(lexer.value(), "b");
        assert_eq!(lexer.start(), 2 + long.len() as u64 + 1);

        lexer.set_position(tell).expect("seek");
        assert_eq!(lexer.value(), long);
        assert_eq!(lexer.start(), 2);
    }

    #[test]
    fn char_access_and_context() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("ctx.txt");
        fs::write(&path, "first line\nsecond lïne here\nthird").expect("write");

        let mut lexer = Lexer::open(&path, Charset::Utf8).expect("open");
        for _ in 0..7 {
            lexer.advance().expect("advance");
        }
        assert_eq!(lexer.value(), "lïne");
        assert_eq!(lexer.char_at(1).expect("char"), 'ï');
        assert_eq!(lexer.char_at(4).expect_err("past end").kind(), ErrorKind::Usage);
        assert_eq!(lexer.debug_context(), "second lïne here");
        assert_eq!(lexer.lexeme_byte_offset(), "first line\nsecond ".len() as u64);
        lexer.advance().expect("space");
        assert_eq!(lexer.lexeme_byte_offset(), "first line\nsecond lïne".len() as u64);
    }

    #[test]
    fn wrong_tell_shape_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut lexer = cfb_lexer(&dir.path().join("cfb.txt"));
        lexer.advance().expect("advance");
        let tell = lexer
            .position()
            .expect("tell")
            .push(crate::core::tell::TellValue::Column(1));
        assert_eq!(lexer.set_position(tell).expect_err("shape").kind(), ErrorKind::Usage);
    }

    #[test]
    fn marks_outside_the_file_are_rejected_before_allocating() {
        use crate::core::tell::{LexerMark, Tell, TellValue};

        let dir = tempdir().expect("tempdir");
        let mut lexer = cfb_lexer(&dir.path().join("cfb.txt"));
        lexer.advance().expect("advance");
        let size = CFB.len() as u64;

        let corrupt = [
            LexerMark {
                channel_offset: 0,
                buffer_offset: usize::MAX / 2,
                char_offset: u64::MAX / 2,
            },
            LexerMark {
                channel_offset: 10,
                buffer_offset: (size - 10 + 1) as usize,
                char_offset: size + 1,
            },
            LexerMark {
                channel_offset: size + 1,
                buffer_offset: 0,
                char_offset: 0,
            },
        ];
        for mark in corrupt {
            let err = lexer
                .set_position(Tell::new(TellValue::Lexer(mark)))
                .expect_err("corrupt mark");
            assert_eq!(err.kind(), ErrorKind::Usage, "{mark:?}");
        }

        let end = LexerMark {
            channel_offset: size,
            buffer_offset: 0,
            char_offset: size,
        };
        lexer
            .set_position(Tell::new(TellValue::Lexer(end)))
            .expect("end of file is a valid mark");
        assert!(!lexer.has_current());
        assert!(!lexer.has_next());
    }
}
