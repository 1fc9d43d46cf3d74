// In-memory record table; record boundaries are explicit cells.
use std::rc::Rc;

use crate::core::data::{DataSink, DataSource, Field, FieldKind};
use crate::core::error::{Error, Result};
use crate::core::source::Seekable;
use crate::core::tell::{Tell, TellValue};

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Field(Field),
    EndOfRecord,
}

#[derive(Clone, Debug, Default)]
pub struct DataMemoryStore {
    cells: Vec<Cell>,
}

impl DataMemoryStore {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| matches!(cell, Cell::EndOfRecord))
            .count()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Appends after whatever the store already holds.
    pub fn sink(&mut self) -> MemorySink<'_> {
        MemorySink { store: self }
    }

    /// A reader over a snapshot of the current contents.
    pub fn source(&self) -> MemorySource {
        MemorySource {
            cells: Rc::from(self.cells.as_slice()),
            index: 0,
        }
    }
}

pub struct MemorySink<'a> {
    store: &'a mut DataMemoryStore,
}

impl MemorySink<'_> {
    fn push(&mut self, field: Field) -> Result<()> {
        self.store.cells.push(Cell::Field(field));
        Ok(())
    }
}

impl DataSink for MemorySink<'_> {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        self.push(Field::Byte(value))
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        self.push(Field::Char(value))
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        self.push(Field::Short(value))
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        self.push(Field::Int(value))
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        self.push(Field::Long(value))
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        self.push(Field::Float(value))
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.push(Field::Double(value))
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.push(Field::Str(value.to_string()))
    }

    fn end_of_record(&mut self) -> Result<()> {
        self.store.cells.push(Cell::EndOfRecord);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct MemorySource {
    cells: Rc<[Cell]>,
    index: usize,
}

impl MemorySource {
    fn next_field(&mut self, kind: FieldKind) -> Result<Field> {
        match self.cells.get(self.index) {
            Some(Cell::Field(field)) if field.kind() == kind => {
                let field = field.clone();
                self.index += 1;
                Ok(field)
            }
            Some(Cell::Field(field)) => Err(self.mismatch(format!(
                "expecting {kind} but found {}",
                field.kind()
            ))),
            Some(Cell::EndOfRecord) => {
                Err(self.mismatch(format!("expecting {kind} but found end of record")))
            }
            None => Err(Error::exhausted("memory store is exhausted")),
        }
    }

    fn mismatch(&self, message: String) -> Error {
        Error::format(message).with_offset(self.index as u64)
    }
}

macro_rules! read_as {
    ($self:ident, $kind:ident) => {
        match $self.next_field(FieldKind::$kind)? {
            Field::$kind(value) => Ok(value),
            _ => Err(Error::new(crate::core::error::ErrorKind::Internal)
                .with_message("field kind changed while reading")),
        }
    };
}

impl DataSource for MemorySource {
    fn read_byte(&mut self) -> Result<i8> {
        read_as!(self, Byte)
    }

    fn read_char(&mut self) -> Result<char> {
        read_as!(self, Char)
    }

    fn read_short(&mut self) -> Result<i16> {
        read_as!(self, Short)
    }

    fn read_int(&mut self) -> Result<i32> {
        read_as!(self, Int)
    }

    fn read_long(&mut self) -> Result<i64> {
        read_as!(self, Long)
    }

    fn read_float(&mut self) -> Result<f32> {
        read_as!(self, Float)
    }

    fn read_double(&mut self) -> Result<f64> {
        read_as!(self, Double)
    }

    fn read_string(&mut self) -> Result<String> {
        read_as!(self, Str)
    }

    fn end_of_record(&mut self) -> Result<()> {
        match self.cells.get(self.index) {
            Some(Cell::EndOfRecord) => {
                self.index += 1;
                Ok(())
            }
            Some(Cell::Field(field)) => Err(self.mismatch(format!(
                "expecting end of record but found {}",
                field.kind()
            ))),
            None => Err(Error::exhausted("memory store is exhausted")),
        }
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        Ok(matches!(self.cells.get(self.index), Some(Cell::EndOfRecord)))
    }

    fn can_read(&mut self) -> Result<bool> {
        Ok(self.index < self.cells.len())
    }
}

impl Seekable for MemorySource {
    type Position = Tell;

    fn position(&self) -> Result<Tell> {
        Ok(Tell::new(TellValue::Index(self.index as u64)))
    }

    fn set_position(&mut self, position: Tell) -> Result<()> {
        let index = position.into_index()?;
        if index > self.cells.len() as u64 {
            return Err(Error::usage(format!(
                "cell {index} is past the end of a {} cell store",
                self.cells.len()
            )));
        }
        self.index = index as usize;
        Ok(())
    }
}
