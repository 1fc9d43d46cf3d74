// Object streams and the seek capability shared by every layer.
use std::cmp::Ordering;
use std::iter::Peekable;

use crate::core::error::{Error, Result};
use crate::core::tell::{Tell, TellValue};

pub trait ObjectSource<T> {
    fn has_next(&mut self) -> Result<bool>;

    fn read(&mut self) -> Result<T>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

pub trait ObjectSink<T> {
    fn write(&mut self, item: T) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capture and restore of a reader's cursor.
pub trait Seekable {
    type Position;

    fn position(&self) -> Result<Self::Position>;

    fn set_position(&mut self, position: Self::Position) -> Result<()>;
}

impl<T, S: ObjectSource<T> + ?Sized> ObjectSource<T> for Box<S> {
    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }

    fn read(&mut self) -> Result<T> {
        (**self).read()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

impl<T, S: ObjectSink<T> + ?Sized> ObjectSink<T> for Box<S> {
    fn write(&mut self, item: T) -> Result<()> {
        (**self).write(item)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<P, S: Seekable<Position = P> + ?Sized> Seekable for Box<S> {
    type Position = P;

    fn position(&self) -> Result<P> {
        (**self).position()
    }

    fn set_position(&mut self, position: P) -> Result<()> {
        (**self).set_position(position)
    }
}

/// Seekable source over an owned list; the position is the next index.
#[derive(Clone, Debug)]
pub struct VecSource<T> {
    items: Vec<T>,
    index: usize,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, index: 0 }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.index
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> From<Vec<T>> for VecSource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: Clone> ObjectSource<T> for VecSource<T> {
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.index < self.items.len())
    }

    fn read(&mut self) -> Result<T> {
        let item = self
            .items
            .get(self.index)
            .cloned()
            .ok_or_else(|| Error::exhausted("list source is exhausted"))?;
        self.index += 1;
        Ok(item)
    }
}

impl<T> Seekable for VecSource<T> {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(Tell::new(TellValue::Index(self.index as u64)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let index = position.into_index()?;
        if index > self.items.len() as u64 {
            return Err(Error::usage(format!(
                "index {index} is past the end of a {} item list",
                self.items.len()
            )));
        }
        self.index = index as usize;
        Ok(())
    }
}

/// Forward-only source over any iterator; items are moved out, not cloned.
pub struct IterSource<I: Iterator> {
    iter: Peekable<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter().peekable(),
        }
    }
}

impl<I: Iterator> ObjectSource<I::Item> for IterSource<I> {
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.iter.peek().is_some())
    }

    fn read(&mut self) -> Result<I::Item> {
        self.iter
            .next()
            .ok_or_else(|| Error::exhausted("iterator source is exhausted"))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySource;

impl<T> ObjectSource<T> for EmptySource {
    fn has_next(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn read(&mut self) -> Result<T> {
        Err(Error::exhausted("source is empty"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct VecSink<T> {
    items: Vec<T>,
    closed: bool,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            closed: false,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> ObjectSink<T> for VecSink<T> {
    fn write(&mut self, item: T) -> Result<()> {
        if self.closed {
            return Err(Error::closed("list sink is closed"));
        }
        self.items.push(item);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub fn read_all<T, S>(source: &mut S) -> Result<Vec<T>>
where
    S: ObjectSource<T> + ?Sized,
{
    let mut items = Vec::new();
    while source.has_next()? {
        items.push(source.read()?);
    }
    Ok(items)
}

/// Move every remaining item of `source` into `sink`; returns the item count.
pub fn copy<T, S, K>(source: &mut S, sink: &mut K) -> Result<u64>
where
    S: ObjectSource<T> + ?Sized,
    K: ObjectSink<T> + ?Sized,
{
    let mut count = 0;
    while source.has_next()? {
        sink.write(source.read()?)?;
        count += 1;
    }
    Ok(count)
}

/// Read and discard the rest of `source`.
pub fn drain<T, S>(source: &mut S) -> Result<u64>
where
    S: ObjectSource<T> + ?Sized,
{
    let mut count = 0;
    while source.has_next()? {
        source.read()?;
        count += 1;
    }
    Ok(count)
}

pub fn equal<T, A, B>(a: &mut A, b: &mut B) -> Result<bool>
where
    T: PartialEq,
    A: ObjectSource<T> + ?Sized,
    B: ObjectSource<T> + ?Sized,
{
    Ok(compare(a, b, |x: &T, y: &T| {
        if x == y {
            Ordering::Equal
        } else {
            Ordering::Less
        }
    })? == Ordering::Equal)
}

/// Lexicographic comparison of two streams; a proper prefix orders first.
pub fn compare<T, A, B, F>(a: &mut A, b: &mut B, mut comparator: F) -> Result<Ordering>
where
    A: ObjectSource<T> + ?Sized,
    B: ObjectSource<T> + ?Sized,
    F: FnMut(&T, &T) -> Ordering,
{
    loop {
        match (a.has_next()?, b.has_next()?) {
            (true, true) => {
                let x = a.read()?;
                let y = b.read()?;
                let order = comparator(&x, &y);
                if order != Ordering::Equal {
                    return Ok(order);
                }
            }
            (true, false) => return Ok(Ordering::Greater),
            (false, true) => return Ok(Ordering::Less),
            (false, false) => return Ok(Ordering::Equal),
        }
    }
}
