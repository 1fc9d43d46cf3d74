//! Purpose: Map integer ids in selected columns to their strings and back.
//! Exports: `Enumerator`, `MemoryEnumerator`, `Selection`, `EnumeratedSink`, `EnumeratedSource`.
//! Role: Record transform between an id-based pipeline and human-readable files.
//! Invariants: A source assigns ids on first sight; a sink only resolves ids already assigned.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::data::{DataSink, DataSource};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::source::Seekable;
use crate::core::tell::{Tell, TellValue};

/// Bidirectional string <-> id table.
pub trait Enumerator {
    /// Id of `value`, assigning the next free id on first sight.
    fn index_of(&mut self, value: &str) -> Result<i32>;

    /// String for `index`; `NotFound` if it was never assigned.
    fn value_of(&self, index: i32) -> Result<String>;
}

impl<E: Enumerator + ?Sized> Enumerator for &mut E {
    fn index_of(&mut self, value: &str) -> Result<i32> {
        (**self).index_of(value)
    }

    fn value_of(&self, index: i32) -> Result<String> {
        (**self).value_of(index)
    }
}

impl<E: Enumerator + ?Sized> Enumerator for Rc<RefCell<E>> {
    fn index_of(&mut self, value: &str) -> Result<i32> {
        self.try_borrow_mut()
            .map_err(|_| Error::usage("enumerator is already borrowed"))?
            .index_of(value)
    }

    fn value_of(&self, index: i32) -> Result<String> {
        self.try_borrow()
            .map_err(|_| Error::usage("enumerator is mutably borrowed"))?
            .value_of(index)
    }
}

/// In-memory enumerator; ids are dense and assigned from 0.
#[derive(Clone, Debug, Default)]
pub struct MemoryEnumerator {
    ids: HashMap<String, i32>,
    values: Vec<String>,
}

impl MemoryEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Id of `value` without assigning one.
    pub fn get(&self, value: &str) -> Option<i32> {
        self.ids.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Enumerator for MemoryEnumerator {
    fn index_of(&mut self, value: &str) -> Result<i32> {
        if let Some(id) = self.ids.get(value) {
            return Ok(*id);
        }
        let id = i32::try_from(self.values.len())
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("enumerator is full"))?;
        self.ids.insert(value.to_string(), id);
        self.values.push(value.to_string());
        Ok(id)
    }

    fn value_of(&self, index: i32) -> Result<String> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.values.get(index))
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound).with_message(format!("no value for id {index}"))
            })
    }
}

type ColumnPredicate = Box<dyn Fn(u32) -> bool>;

/// Which int columns are enumerated, and by which table.
pub enum Selection<E> {
    All(E),
    Predicate(E, ColumnPredicate),
    PerColumn(Vec<Option<E>>),
}

impl<E: Enumerator> Selection<E> {
    pub fn all(enumerator: E) -> Self {
        Selection::All(enumerator)
    }

    pub fn columns(enumerator: E, predicate: impl Fn(u32) -> bool + 'static) -> Self {
        Selection::Predicate(enumerator, Box::new(predicate))
    }

    pub fn per_column(enumerators: Vec<Option<E>>) -> Self {
        Selection::PerColumn(enumerators)
    }

    pub fn get_mut(&mut self, column: u32) -> Option<&mut E> {
        match self {
            Selection::All(enumerator) => Some(enumerator),
            Selection::Predicate(enumerator, predicate) => {
                predicate(column).then_some(enumerator)
            }
            Selection::PerColumn(enumerators) => enumerators
                .get_mut(column as usize)
                .and_then(Option::as_mut),
        }
    }
}

pub struct EnumeratedSink<S, E> {
    inner: S,
    selection: Selection<E>,
    column: u32,
}

impl<S: DataSink, E: Enumerator> EnumeratedSink<S, E> {
    pub fn new(inner: S, selection: Selection<E>) -> Self {
        Self {
            inner,
            selection,
            column: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn forward(&mut self, write: impl FnOnce(&mut S) -> Result<()>) -> Result<()> {
        write(&mut self.inner)?;
        self.column += 1;
        Ok(())
    }
}

impl<S: DataSink, E: Enumerator> DataSink for EnumeratedSink<S, E> {
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
        match self.selection.get_mut(self.column) {
            Some(enumerator) => {
                let text = enumerator.value_of(value)?;
                self.forward(|inner| inner.write_string(&text))
            }
            None => self.forward(|inner| inner.write_int(value)),
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

pub struct EnumeratedSource<S, E> {
    inner: S,
    selection: Selection<E>,
    column: u32,
}

impl<S: DataSource, E: Enumerator> EnumeratedSource<S, E> {
    pub fn new(inner: S, selection: Selection<E>) -> Self {
        Self {
            inner,
            selection,
            column: 0,
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

impl<S: DataSource, E: Enumerator> DataSource for EnumeratedSource<S, E> {
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
        let value = match self.selection.get_mut(self.column) {
            Some(enumerator) => {
                let text = self.inner.read_string()?;
                enumerator.index_of(&text)?
            }
            None => self.inner.read_int()?,
        };
        self.column += 1;
        Ok(value)
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

impl<S, E> Seekable for EnumeratedSource<S, E>
where
    S: DataSource + Seekable<Position = Tell>,
    E: Enumerator,
{
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(self.inner.position()?.push(TellValue::Column(self.column)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let (column, rest) = position.pop_column()?;
        self.inner.set_position(rest)?;
        self.column = column;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EnumeratedSink, EnumeratedSource, Enumerator, MemoryEnumerator, Selection};
    use crate::core::data::{DataSink, DataSource, Field};
    use crate::core::error::ErrorKind;
    use crate::core::memory::{Cell, DataMemoryStore};
    use crate::core::source::Seekable;

    #[test]
    fn memory_enumerator_assigns_dense_ids() {
        let mut table = MemoryEnumerator::new();
        assert_eq!(table.index_of("cat").expect("cat"), 0);
        assert_eq!(table.index_of("dog").expect("dog"), 1);
        assert_eq!(table.index_of("cat").expect("cat again"), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("eel"), None);
        assert_eq!(table.value_of(1).expect("dog"), "dog");
        assert_eq!(table.value_of(2).expect_err("unassigned").kind(), ErrorKind::NotFound);
        assert_eq!(table.value_of(-1).expect_err("negative").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn shared_table_round_trips_selected_columns() {
        let table = MemoryEnumerator::shared();
        let words = ["to", "be", "or", "not", "to", "be"];

        let mut store = DataMemoryStore::new();
        {
            let selection = Selection::columns(table.clone(), |c| c == 0);
            let mut sink = EnumeratedSink::new(store.sink(), selection);
            for word in words {
                let id = table.borrow_mut().index_of(word).expect("id");
                sink.write_int(id).expect("word");
                sink.write_int(id).expect("raw id");
                sink.end_of_record().expect("eor");
            }
        }
        assert_eq!(store.cells()[0], Cell::Field(Field::Str("to".into())));
        assert_eq!(store.cells()[1], Cell::Field(Field::Int(0)));

        let selection = Selection::columns(table.clone(), |c| c == 0);
        let mut source = EnumeratedSource::new(store.source(), selection);
        let mut decoded = Vec::new();
        let mut tell = None;
        while source.can_read().expect("can read") {
            if decoded.len() == 3 {
                tell = Some(source.position().expect("tell"));
            }
            let id = source.read_int().expect("word id");
            assert_eq!(source.read_int().expect("raw id"), id);
            source.end_of_record().expect("eor");
            decoded.push(id);
        }
        assert_eq!(decoded, vec![0, 1, 2, 3, 0, 1]);
        assert_eq!(table.borrow().len(), 4);

        source.set_position(tell.expect("captured")).expect("seek");
        assert_eq!(source.read_int().expect("not"), 3);
    }

    #[test]
    fn per_column_tables_are_independent() {
        let mut left = MemoryEnumerator::new();
        let mut right = MemoryEnumerator::new();
        let mut store = DataMemoryStore::new();
        store.sink().write_string("x").expect("x");
        store.sink().write_string("y").expect("y");
        store.sink().write_string("x").expect("x");
        store.sink().end_of_record().expect("eor");

        let selection = Selection::per_column(vec![Some(&mut left), None, Some(&mut right)]);
        let mut source = EnumeratedSource::new(store.source(), selection);
        assert_eq!(source.read_int().expect("left"), 0);
        assert_eq!(source.read_string().expect("plain"), "y");
        assert_eq!(source.read_int().expect("right"), 0);
        source.end_of_record().expect("eor");
        drop(source);
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mut store = DataMemoryStore::new();
        let selection = Selection::all(MemoryEnumerator::new());
        let mut sink = EnumeratedSink::new(store.sink(), selection);
        assert_eq!(sink.write_int(7).expect_err("unassigned").kind(), ErrorKind::NotFound);
    }
}
