//! Purpose: Delta coding of selected integer columns.
//! Exports: `DeltasSink`, `DeltasSource`.
//! Role: Record transform that turns sorted id columns into small gaps.
//! Invariants: One running `previous` per instance; it is not reset at record boundaries.
//! Invariants: Only `write_int`/`read_int` in selected columns are transformed.
use crate::core::data::{DataSink, DataSource};
use crate::core::error::Result;
use crate::core::source::Seekable;
use crate::core::tell::{Tell, TellValue};

type AllColumns = fn(u32) -> bool;

pub struct DeltasSink<S, P> {
    inner: S,
    predicate: P,
    column: u32,
    previous: i32,
}

impl<S: DataSink, P: Fn(u32) -> bool> DeltasSink<S, P> {
    pub fn new(inner: S, predicate: P) -> Self {
        Self {
            inner,
            predicate,
            column: 0,
            previous: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DataSink> DeltasSink<S, AllColumns> {
    pub fn all(inner: S) -> Self {
        Self::new(inner, |_| true)
    }
}

impl<S: DataSink, P: Fn(u32) -> bool> DeltasSink<S, P> {
    fn forward(&mut self, write: impl FnOnce(&mut S) -> Result<()>) -> Result<()> {
        write(&mut self.inner)?;
        self.column += 1;
        Ok(())
    }
}

impl<S: DataSink, P: Fn(u32) -> bool> DataSink for DeltasSink<S, P> {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        self.forward(|inner| inner.write_byte(value))
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        self.forward(|inner| inner.write_char(value))
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        self.forward(|inner| inner.write_short(value))
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        if (self.predicate)(self.column) {
            let delta = value.wrapping_sub(self.previous);
            self.previous = value;
            self.forward(|inner| inner.write_int(delta))
        } else {
            self.forward(|inner| inner.write_int(value))
        }
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        self.forward(|inner| inner.write_long(value))
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        self.forward(|inner| inner.write_float(value))
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.forward(|inner| inner.write_double(value))
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.forward(|inner| inner.write_string(value))
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.column = 0;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

pub struct DeltasSource<S, P> {
    inner: S,
    predicate: P,
    column: u32,
    previous: i32,
}

impl<S: DataSource, P: Fn(u32) -> bool> DeltasSource<S, P> {
    pub fn new(inner: S, predicate: P) -> Self {
        Self {
            inner,
            predicate,
            column: 0,
            previous: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn forward<T>(&mut self, read: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let value = read(&mut self.inner)?;
        self.column += 1;
        Ok(value)
    }
}

impl<S: DataSource> DeltasSource<S, AllColumns> {
    pub fn all(inner: S) -> Self {
        Self::new(inner, |_| true)
    }
}

impl<S: DataSource, P: Fn(u32) -> bool> DataSource for DeltasSource<S, P> {
    fn read_byte(&mut self) -> Result<i8> {
        self.forward(|inner| inner.read_byte())
    }

    fn read_char(&mut self) -> Result<char> {
        self.forward(|inner| inner.read_char())
    }

    fn read_short(&mut self) -> Result<i16> {
        self.forward(|inner| inner.read_short())
    }

    fn read_int(&mut self) -> Result<i32> {
        let selected = (self.predicate)(self.column);
        let value = self.forward(|inner| inner.read_int())?;
        if !selected {
            return Ok(value);
        }
        self.previous = self.previous.wrapping_add(value);
        Ok(self.previous)
    }

    fn read_long(&mut self) -> Result<i64> {
        self.forward(|inner| inner.read_long())
    }

    fn read_float(&mut self) -> Result<f32> {
        self.forward(|inner| inner.read_float())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.forward(|inner| inner.read_double())
    }

    fn read_string(&mut self) -> Result<String> {
        self.forward(|inner| inner.read_string())
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.inner.end_of_record()?;
        self.column = 0;
        Ok(())
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        self.inner.is_end_of_record_next()
    }

    fn can_read(&mut self) -> Result<bool> {
        self.inner.can_read()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

impl<S, P> Seekable for DeltasSource<S, P>
where
    S: DataSource + Seekable<Position = Tell>,
    P: Fn(u32) -> bool,
{
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(self
            .inner
            .position()?
            .push(TellValue::Column(self.column))
            .push(TellValue::Delta(self.previous)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let (previous, rest) = position.pop_delta()?;
        let (column, rest) = rest.pop_column()?;
        self.inner.set_position(rest)?;
        self.column = column;
        self.previous = previous;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeltasSink, DeltasSource};
    use crate::core::data::{DataSink, DataSource, Field};
    use crate::core::memory::{Cell, DataMemoryStore};
    use crate::core::source::Seekable;

    #[test]
    fn selected_columns_store_gaps() {
        let rows = [(10, 1000), (12, 7), (12, 9), (3, i32::MAX)];
        let mut store = DataMemoryStore::new();
        {
            let mut sink = DeltasSink::new(store.sink(), |column| column == 0);
            for (id, count) in rows {
                sink.write_int(id).expect("id");
                sink.write_int(count).expect("count");
                sink.end_of_record().expect("eor");
            }
        }
        let stored: Vec<_> = store
            .cells()
            .iter()
            .filter_map(|cell| match cell {
                Cell::Field(Field::Int(value)) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(stored, vec![10, 1000, 2, 7, 0, 9, -9, i32::MAX]);

        let mut source = DeltasSource::new(store.source(), |column| column == 0);
        for (id, count) in rows {
            assert_eq!(source.read_int().expect("id"), id);
            assert_eq!(source.read_int().expect("count"), count);
            source.end_of_record().expect("eor");
        }
        assert!(!source.can_read().expect("can read"));
    }

    #[test]
    fn every_column_shares_one_running_value() {
        let mut store = DataMemoryStore::new();
        {
            let mut sink = DeltasSink::all(store.sink());
            sink.write_string("k").expect("string");
            sink.write_int(5).expect("int");
            sink.write_int(8).expect("int");
            sink.end_of_record().expect("eor");
            sink.write_int(i32::MIN).expect("wrapping");
            sink.end_of_record().expect("eor");
        }
        assert_eq!(store.cells()[2], Cell::Field(Field::Int(3)));

        let mut source = DeltasSource::all(store.source());
        assert_eq!(source.read_string().expect("string"), "k");
        assert_eq!(source.read_int().expect("int"), 5);
        let tell = source.position().expect("tell");
        assert_eq!(source.read_int().expect("int"), 8);
        source.end_of_record().expect("eor");
        assert_eq!(source.read_int().expect("wrapping"), i32::MIN);

        source.set_position(tell).expect("seek");
        assert_eq!(source.read_int().expect("int again"), 8);
    }
}
