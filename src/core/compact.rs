//! Purpose: Run-length compaction of the first column across consecutive records.
//! Exports: `CompactSink`, `CompactSource`.
//! Role: Record transform; `(a,1),(a,2),(b,3)` is stored as `a 1 2 / b 3`.
//! Invariants: The sink emits an inner record boundary only when the head changes or on close.
//! Invariants: The source serves every compacted record with exactly `num_columns` fields.
use crate::core::data::{DataSink, DataSource, Field, FieldKind};
use crate::core::error::{close_all, Error, ErrorKind, Result};
use crate::core::source::Seekable;
use crate::core::tell::{Tell, TellValue};

pub struct CompactSink<S> {
    inner: S,
    head: Option<Field>,
    column: u32,
}

impl<S: DataSink> CompactSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            head: None,
            column: 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Whether the current write reaches the inner sink. Column 0 only gets
    /// through when it starts a new head, closing the previous inner record.
    fn admit(&mut self, head: impl FnOnce() -> Field) -> Result<bool> {
        if self.column > 0 {
            return Ok(true);
        }
        let head = head();
        if self.head.as_ref() == Some(&head) {
            return Ok(false);
        }
        if self.head.is_some() {
            self.inner.end_of_record()?;
        }
        self.head = Some(head);
        Ok(true)
    }
}

macro_rules! compact_write {
    ($self:ident, $write:ident, $value:expr, $field:expr) => {{
        if $self.admit(|| $field)? {
            $self.inner.$write($value)?;
        }
        $self.column += 1;
        Ok(())
    }};
}

impl<S: DataSink> DataSink for CompactSink<S> {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        compact_write!(self, write_byte, value, Field::Byte(value))
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        compact_write!(self, write_char, value, Field::Char(value))
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        compact_write!(self, write_short, value, Field::Short(value))
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        compact_write!(self, write_int, value, Field::Int(value))
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        compact_write!(self, write_long, value, Field::Long(value))
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        compact_write!(self, write_float, value, Field::Float(value))
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        compact_write!(self, write_double, value, Field::Double(value))
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        compact_write!(self, write_string, value, Field::Str(value.to_string()))
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        let pending = match self.head.take() {
            Some(_) => self.inner.end_of_record(),
            None => Ok(()),
        };
        let flushed = self.inner.flush();
        let closed = self.inner.close();
        close_all([pending, flushed, closed])
    }
}

pub struct CompactSource<S> {
    inner: S,
    num_columns: u32,
    head: Option<Field>,
    column: u32,
}

impl<S: DataSource> CompactSource<S> {
    /// `num_columns` counts the head column.
    pub fn new(inner: S, num_columns: u32) -> Result<Self> {
        if num_columns == 0 {
            return Err(Error::usage("compact records need at least one column"));
        }
        Ok(Self {
            inner,
            num_columns,
            head: None,
            column: 0,
        })
    }

    pub fn num_columns(&self) -> u32 {
        self.num_columns
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn head_field(&mut self, kind: FieldKind) -> Result<Field> {
        match &self.head {
            Some(head) if head.kind() == kind => Ok(head.clone()),
            Some(head) => Err(Error::usage(format!(
                "head column was read as {} but is now requested as {kind}",
                head.kind()
            ))),
            None => {
                let head = self.inner.read_field(kind)?;
                self.head = Some(head.clone());
                Ok(head)
            }
        }
    }
}

macro_rules! compact_read {
    ($self:ident, $read:ident, $kind:ident) => {{
        let value = if $self.column == 0 {
            match $self.head_field(FieldKind::$kind)? {
                Field::$kind(value) => value,
                _ => {
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message("cached head changed kind"));
                }
            }
        } else {
            $self.inner.$read()?
        };
        $self.column += 1;
        Ok(value)
    }};
}

impl<S: DataSource> DataSource for CompactSource<S> {
    fn read_byte(&mut self) -> Result<i8> {
        compact_read!(self, read_byte, Byte)
    }

    fn read_char(&mut self) -> Result<char> {
        compact_read!(self, read_char, Char)
    }

    fn read_short(&mut self) -> Result<i16> {
        compact_read!(self, read_short, Short)
    }

    fn read_int(&mut self) -> Result<i32> {
        compact_read!(self, read_int, Int)
    }

    fn read_long(&mut self) -> Result<i64> {
        compact_read!(self, read_long, Long)
    }

    fn read_float(&mut self) -> Result<f32> {
        compact_read!(self, read_float, Float)
    }

    fn read_double(&mut self) -> Result<f64> {
        compact_read!(self, read_double, Double)
    }

    fn read_string(&mut self) -> Result<String> {
        compact_read!(self, read_string, Str)
    }

    fn end_of_record(&mut self) -> Result<()> {
        if self.column != self.num_columns {
            return Err(Error::usage(format!(
                "end of record after {} of {} columns",
                self.column, self.num_columns
            )));
        }
        self.column = 0;
        if self.inner.is_end_of_record_next()? {
            self.head = None;
            self.inner.end_of_record()?;
        }
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        Ok(self.column == self.num_columns)
    }

    fn can_read(&mut self) -> Result<bool> {
        self.inner.can_read()
    }

    fn close(&mut self) -> Result<()> {
        self.head = None;
        self.inner.close()
    }
}

impl<S: DataSource + Seekable<Position = Tell>> Seekable for CompactSource<S> {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(self
            .inner
            .position()?
            .push(TellValue::Head(self.head.clone()))
            .push(TellValue::Column(self.column)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let (column, rest) = position.pop_column()?;
        let (head, rest) = rest.pop_head()?;
        self.inner.set_position(rest)?;
        self.head = head;
        self.column = column;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CompactSink, CompactSource};
    use crate::core::data::{DataSink, DataSource};
    use crate::core::error::ErrorKind;
    use crate::core::memory::{Cell, DataMemoryStore};
    use crate::core::source::Seekable;

    fn compacted(rows: &[(&str, i32)]) -> DataMemoryStore {
        let mut store = DataMemoryStore::new();
        {
            let mut sink = CompactSink::new(store.sink());
            for (key, value) in rows {
                sink.write_string(key).expect("key");
                sink.write_int(*value).expect("value");
                sink.end_of_record().expect("eor");
            }
            sink.close().expect("close");
        }
        store
    }

    fn read_rows(source: &mut CompactSource<impl DataSource>) -> Vec<(String, i32)> {
        let mut rows = Vec::new();
        while source.can_read().expect("can read") {
            let key = source.read_string().expect("key");
            let value = source.read_int().expect("value");
            assert!(source.is_end_of_record_next().expect("eor next"));
            source.end_of_record().expect("eor");
            rows.push((key, value));
        }
        rows
    }

    #[test]
    fn equal_heads_share_one_inner_record() {
        let store = compacted(&[("a", 1), ("a", 2), ("b", 3), ("a", 4)]);
        assert_eq!(store.record_count(), 3);
        assert_eq!(store.cells().len(), 3 + 7);
        assert_eq!(store.cells()[3], Cell::EndOfRecord);

        let mut source = CompactSource::new(store.source(), 2).expect("source");
        let rows = read_rows(&mut source);
        let expected = [("a", 1), ("a", 2), ("b", 3), ("a", 4)];
        assert_eq!(rows.len(), expected.len());
        for ((key, value), (want_key, want_value)) in rows.iter().zip(expected) {
            assert_eq!((key.as_str(), *value), (want_key, want_value));
        }
    }

    #[test]
    fn empty_input_writes_nothing() {
        let store = compacted(&[]);
        assert!(store.is_empty());
    }

    #[test]
    fn seek_restores_the_cached_head() {
        let store = compacted(&[("a", 1), ("a", 2), ("a", 3), ("b", 4)]);
        let mut source = CompactSource::new(store.source(), 2).expect("source");
        source.read_string().expect("a");
        source.read_int().expect("1");
        source.end_of_record().expect("eor");
        let tell = source.position().expect("tell");
        assert_eq!(tell.depth(), 3);

        let rest = read_rows(&mut source);
        assert_eq!(rest.len(), 3);

        source.set_position(tell).expect("seek");
        assert_eq!(source.read_string().expect("a"), "a");
        assert_eq!(source.read_int().expect("2"), 2);
    }

    #[test]
    fn early_end_of_record_is_a_usage_error() {
        let store = compacted(&[("a", 1)]);
        let mut source = CompactSource::new(store.source(), 2).expect("source");
        source.read_string().expect("a");
        let err = source.end_of_record().expect_err("one column short");
        assert_eq!(err.kind(), ErrorKind::Usage);

        assert_eq!(
            CompactSource::new(store.source(), 0).err().map(|err| err.kind()),
            Some(ErrorKind::Usage)
        );
    }
}
