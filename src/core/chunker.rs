// Split an object stream into bounded, labelled chunks.
use std::marker::PhantomData;

use crate::core::error::{Error, Result};
use crate::core::source::{ObjectSource, Seekable, VecSource};
use crate::core::tell::Tell;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// A labelled batch of items, readable as a seekable source.
#[derive(Clone, Debug)]
pub struct Chunk<T> {
    label: String,
    items: VecSource<T>,
}

impl<T> Chunk<T> {
    pub fn new(label: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            label: label.into(),
            items: VecSource::new(items),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn items(&self) -> &[T] {
        self.items.as_slice()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items.into_vec()
    }
}

impl<T: Clone> ObjectSource<T> for Chunk<T> {
    fn has_next(&mut self) -> Result<bool> {
        self.items.has_next()
    }

    fn read(&mut self) -> Result<T> {
        self.items.read()
    }
}

impl<T> Seekable for Chunk<T> {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        self.items.position()
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        self.items.set_position(position)
    }
}

pub struct Chunker<T, S> {
    inner: S,
    max_chunk_size: usize,
    chunks_read: u64,
    _items: PhantomData<fn() -> T>,
}

impl<T, S: ObjectSource<T>> Chunker<T, S> {
    pub fn new(inner: S, max_chunk_size: usize) -> Result<Self> {
        check_chunk_size(max_chunk_size)?;
        Ok(Self {
            inner,
            max_chunk_size,
            chunks_read: 0,
            _items: PhantomData,
        })
    }

    pub fn with_default_size(inner: S) -> Self {
        Self {
            inner,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            chunks_read: 0,
            _items: PhantomData,
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Applies from the next chunk read.
    pub fn set_max_chunk_size(&mut self, max_chunk_size: usize) -> Result<()> {
        check_chunk_size(max_chunk_size)?;
        self.max_chunk_size = max_chunk_size;
        Ok(())
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<T, S: ObjectSource<T>> ObjectSource<Chunk<T>> for Chunker<T, S> {
    fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    fn read(&mut self) -> Result<Chunk<T>> {
        if !self.inner.has_next()? {
            return Err(Error::exhausted("chunker input is exhausted"));
        }
        let mut items = Vec::with_capacity(self.max_chunk_size.min(4096));
        while items.len() < self.max_chunk_size && self.inner.has_next()? {
            items.push(self.inner.read()?);
        }
        let chunk = Chunk::new(format!("chunk-{}", self.chunks_read), items);
        self.chunks_read += 1;
        Ok(chunk)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

impl<T, S: Seekable> Seekable for Chunker<T, S> {
    type Position = S::Position;

    fn position(&self) -> Result<S::Position> {
        self.inner.position()
    }

    fn set_position(&mut self, position: S::Position) -> Result<()> {
        self.inner.set_position(position)
    }
}

fn check_chunk_size(max_chunk_size: usize) -> Result<()> {
    if max_chunk_size == 0 {
        return Err(Error::usage("max chunk size must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Chunker, DEFAULT_MAX_CHUNK_SIZE};
    use crate::core::error::ErrorKind;
    use crate::core::source::{read_all, IterSource, ObjectSource, Seekable, VecSource};

    #[test]
    fn chunks_are_bounded_and_ordered() {
        let mut chunker = Chunker::with_default_size(IterSource::new(0..2500));
        assert_eq!(chunker.max_chunk_size(), DEFAULT_MAX_CHUNK_SIZE);
        let chunks = read_all(&mut chunker).expect("chunks");
        let sizes: Vec<_> = chunks.iter().map(|chunk| chunk.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(chunks[2].label(), "chunk-2");

        let flat: Vec<i32> = chunks.into_iter().flat_map(|chunk| chunk.into_items()).collect();
        assert_eq!(flat, (0..2500).collect::<Vec<_>>());
        assert_eq!(chunker.read().expect_err("done").kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let mut chunker = Chunker::new(IterSource::new(Vec::<u8>::new()), 3).expect("chunker");
        assert!(!chunker.has_next().expect("has next"));
        assert!(read_all(&mut chunker).expect("chunks").is_empty());
    }

    #[test]
    fn position_delegates_to_the_inner_source() {
        let mut chunker = Chunker::new(VecSource::new(vec!['a', 'b', 'c', 'd', 'e']), 2)
            .expect("chunker");
        chunker.read().expect("first");
        let tell = chunker.position().expect("tell");
        assert_eq!(chunker.read().expect("second").items(), &['c', 'd']);

        chunker.set_position(tell).expect("seek");
        chunker.set_max_chunk_size(3).expect("resize");
        assert_eq!(chunker.read().expect("again").items(), &['c', 'd', 'e']);
        assert_eq!(
            chunker.set_max_chunk_size(0).expect_err("zero").kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn a_chunk_is_itself_a_seekable_source() {
        let mut chunker = Chunker::new(VecSource::new(vec![1, 2, 3]), 5).expect("chunker");
        let mut chunk = chunker.read().expect("chunk");
        let start = chunk.position().expect("tell");
        assert_eq!(read_all(&mut chunk).expect("items"), vec![1, 2, 3]);
        chunk.set_position(start).expect("rewind");
        assert_eq!(chunk.read().expect("first"), 1);
    }
}
