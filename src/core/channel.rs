//! Purpose: Decode a file into characters through a bounded memory-mapped window.
//! Exports: `CharFileChannel`, `ChannelOptions`, `DEFAULT_MAX_MAPPED_BYTES`.
//! Role: Byte-addressable character source under the lexer; handles files past 2^31 bytes.
//! Invariants: `position()` is the byte offset of the next undecoded byte and is always a
//! character boundary unless the file ends inside a sequence.
//! Invariants: The mapped window never exceeds `max_mapped_bytes` and is replaced lazily on seek.
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::{debug, trace};

use crate::core::charset::{Charset, DecodeOptions};
use crate::core::error::{Error, Result};

pub const DEFAULT_MAX_MAPPED_BYTES: usize = i32::MAX as usize;
const MIN_MAPPED_BYTES: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct ChannelOptions {
    pub charset: Charset,
    pub max_mapped_bytes: usize,
    pub decode: DecodeOptions,
}

impl ChannelOptions {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            max_mapped_bytes: DEFAULT_MAX_MAPPED_BYTES,
            decode: DecodeOptions::new(),
        }
    }

    pub fn with_max_mapped_bytes(mut self, max_mapped_bytes: usize) -> Self {
        self.max_mapped_bytes = max_mapped_bytes;
        self
    }

    pub fn with_decode(mut self, decode: DecodeOptions) -> Self {
        self.decode = decode;
        self
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new(Charset::Utf8)
    }
}

#[derive(Debug)]
pub struct CharFileChannel {
    path: PathBuf,
    file: Option<File>,
    charset: Charset,
    decode: DecodeOptions,
    max_mapped_bytes: usize,
    window: Option<Mmap>,
    window_offset: u64,
    cursor: usize,
    size: u64,
}

impl CharFileChannel {
    pub fn open(path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        Self::open_with(path, ChannelOptions::new(charset))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ChannelOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|err| Error::io(err, &path))?;
        Self::from_file(file, path, options)
    }

    /// Wrap an already opened, readable file. `path` is used for diagnostics only.
    pub fn from_file(file: File, path: impl Into<PathBuf>, options: ChannelOptions) -> Result<Self> {
        let path = path.into();
        check_max_mapped_bytes(options.max_mapped_bytes)?;
        let size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::io(err, &path))?;
        debug!(path = %path.display(), size, charset = %options.charset, "opened channel");
        Ok(Self {
            path,
            file: Some(file),
            charset: options.charset,
            decode: options.decode,
            max_mapped_bytes: options.max_mapped_bytes,
            window: None,
            window_offset: 0,
            cursor: 0,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode
    }

    pub fn position(&self) -> u64 {
        self.window_offset + self.cursor as u64
    }

    pub fn set_position(&mut self, position: u64) -> Result<()> {
        self.ensure_open()?;
        if let Some(window) = &self.window
            && position >= self.window_offset
            && position <= self.window_offset + window.len() as u64
        {
            self.cursor = (position - self.window_offset) as usize;
            return Ok(());
        }
        self.window = None;
        self.window_offset = position;
        self.cursor = 0;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.size.saturating_sub(self.position())
    }

    pub fn has_bytes_remaining(&self) -> bool {
        self.bytes_remaining() > 0
    }

    pub fn max_mapped_bytes(&self) -> usize {
        self.max_mapped_bytes
    }

    /// Takes effect at the next remap.
    pub fn set_max_mapped_bytes(&mut self, max_mapped_bytes: usize) -> Result<()> {
        check_max_mapped_bytes(max_mapped_bytes)?;
        self.max_mapped_bytes = max_mapped_bytes;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            self.window = None;
            debug!(path = %self.path.display(), "closed channel");
        }
        Ok(())
    }

    /// Decode into `dst` until it is full or the file is exhausted; returns the chars written.
    pub fn read(&mut self, dst: &mut [char]) -> Result<usize> {
        self.ensure_open()?;
        if dst.is_empty() {
            return Err(Error::usage("read destination is empty"));
        }

        let widest = self.charset.max_bytes_per_char();
        let mut written = 0;
        while written < dst.len() && self.has_bytes_remaining() {
            let room = dst.len() - written;
            self.ensure_mapped(room.saturating_mul(widest))?;
            let base = self.position();
            let Some(window) = &self.window else {
                break;
            };
            let at_eof = self.window_offset + window.len() as u64 >= self.size;
            let (consumed, produced) = self.charset.decode(
                &window[self.cursor..],
                at_eof,
                &mut dst[written..],
                &self.decode,
                base,
            )?;
            self.cursor += consumed;
            written += produced;

            if consumed == 0 && produced == 0 {
                // The window ends inside a sequence; restart it at the cursor.
                if at_eof {
                    break;
                }
                self.remap()?;
            }
        }
        Ok(written)
    }

    /// Copy up to `len` raw bytes starting at `offset` without moving the cursor.
    pub fn read_bytes_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::closed("channel is closed"))?;
        let offset = offset.min(self.size);
        let len = len.min((self.size - offset) as usize);
        if len == 0 {
            return Ok(Vec::new());
        }
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map(file)
                .map_err(|err| Error::io(err, &self.path))?
        };
        Ok(map.to_vec())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::closed("channel is closed").with_path(&self.path));
        }
        Ok(())
    }

    fn ensure_mapped(&mut self, required: usize) -> Result<()> {
        let required = required.min(self.max_mapped_bytes);
        if let Some(window) = &self.window {
            let mapped_left = window.len() - self.cursor;
            let window_end = self.window_offset + window.len() as u64;
            if mapped_left >= required || window_end >= self.size {
                return Ok(());
            }
        }
        self.remap()
    }

    fn remap(&mut self) -> Result<()> {
        self.window_offset += self.cursor as u64;
        self.cursor = 0;
        self.window = None;

        let len = self
            .size
            .saturating_sub(self.window_offset)
            .min(self.max_mapped_bytes as u64) as usize;
        if len == 0 {
            return Ok(());
        }
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::closed("channel is closed"))?;
        let map = unsafe {
            MmapOptions::new()
                .offset(self.window_offset)
                .len(len)
                .map(file)
                .map_err(|err| Error::io(err, &self.path).with_offset(self.window_offset))?
        };
        trace!(path = %self.path.display(), offset = self.window_offset, len, "mapped window");
        self.window = Some(map);
        Ok(())
    }
}

fn check_max_mapped_bytes(max_mapped_bytes: usize) -> Result<()> {
    if !(MIN_MAPPED_BYTES..=DEFAULT_MAX_MAPPED_BYTES).contains(&max_mapped_bytes) {
        return Err(Error::usage(format!(
            "max mapped bytes must be between {MIN_MAPPED_BYTES} and {DEFAULT_MAX_MAPPED_BYTES}, got {max_mapped_bytes}"
        )));
    }
    Ok(())
}
