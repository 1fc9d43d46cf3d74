// Typed record contract that every reader, writer and transform forwards through.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::source::Seekable;
use crate::core::tell::Tell;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
}

/// One typed column value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Byte(_) => FieldKind::Byte,
            Field::Char(_) => FieldKind::Char,
            Field::Short(_) => FieldKind::Short,
            Field::Int(_) => FieldKind::Int,
            Field::Long(_) => FieldKind::Long,
            Field::Float(_) => FieldKind::Float,
            Field::Double(_) => FieldKind::Double,
            Field::Str(_) => FieldKind::Str,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Byte => "byte",
            FieldKind::Char => "char",
            FieldKind::Short => "short",
            FieldKind::Int => "int",
            FieldKind::Long => "long",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::Str => "string",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Byte(value) => write!(f, "{value}"),
            Field::Char(value) => write!(f, "{value}"),
            Field::Short(value) => write!(f, "{value}"),
            Field::Int(value) => write!(f, "{value}"),
            Field::Long(value) => write!(f, "{value}"),
            Field::Float(value) => write!(f, "{value}"),
            Field::Double(value) => write!(f, "{value}"),
            Field::Str(value) => f.write_str(value),
        }
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Long(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Double(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Str(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Str(value)
    }
}

pub trait DataSink {
    fn write_byte(&mut self, value: i8) -> Result<()>;
    fn write_char(&mut self, value: char) -> Result<()>;
    fn write_short(&mut self, value: i16) -> Result<()>;
    fn write_int(&mut self, value: i32) -> Result<()>;
    fn write_long(&mut self, value: i64) -> Result<()>;
    fn write_float(&mut self, value: f32) -> Result<()>;
    fn write_double(&mut self, value: f64) -> Result<()>;
    fn write_string(&mut self, value: &str) -> Result<()>;

    /// Terminate the current record.
    fn end_of_record(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_field(&mut self, field: &Field) -> Result<()> {
        match field {
            Field::Byte(value) => self.write_byte(*value),
            Field::Char(value) => self.write_char(*value),
            Field::Short(value) => self.write_short(*value),
            Field::Int(value) => self.write_int(*value),
            Field::Long(value) => self.write_long(*value),
            Field::Float(value) => self.write_float(*value),
            Field::Double(value) => self.write_double(*value),
            Field::Str(value) => self.write_string(value),
        }
    }
}

pub trait DataSource {
    fn read_byte(&mut self) -> Result<i8>;
    fn read_char(&mut self) -> Result<char>;
    fn read_short(&mut self) -> Result<i16>;
    fn read_int(&mut self) -> Result<i32>;
    fn read_long(&mut self) -> Result<i64>;
    fn read_float(&mut self) -> Result<f32>;
    fn read_double(&mut self) -> Result<f64>;
    fn read_string(&mut self) -> Result<String>;

    /// Consume the boundary of the current record.
    fn end_of_record(&mut self) -> Result<()>;

    /// True when the next item in the stream is a record boundary.
    fn is_end_of_record_next(&mut self) -> Result<bool>;

    /// True while any further field or boundary can be read.
    fn can_read(&mut self) -> Result<bool>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_field(&mut self, kind: FieldKind) -> Result<Field> {
        Ok(match kind {
            FieldKind::Byte => Field::Byte(self.read_byte()?),
            FieldKind::Char => Field::Char(self.read_char()?),
            FieldKind::Short => Field::Short(self.read_short()?),
            FieldKind::Int => Field::Int(self.read_int()?),
            FieldKind::Long => Field::Long(self.read_long()?),
            FieldKind::Float => Field::Float(self.read_float()?),
            FieldKind::Double => Field::Double(self.read_double()?),
            FieldKind::Str => Field::Str(self.read_string()?),
        })
    }
}

/// A record source whose cursor can be captured as a `Tell` and restored.
pub trait SeekableDataSource: DataSource + Seekable<Position = Tell> {}

impl<S> SeekableDataSource for S where S: DataSource + Seekable<Position = Tell> + ?Sized {}

impl<S: DataSink + ?Sized> DataSink for Box<S> {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        (**self).write_byte(value)
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        (**self).write_char(value)
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        (**self).write_short(value)
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        (**self).write_int(value)
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        (**self).write_long(value)
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        (**self).write_float(value)
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        (**self).write_double(value)
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        (**self).write_string(value)
    }

    fn end_of_record(&mut self) -> Result<()> {
        (**self).end_of_record()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn read_byte(&mut self) -> Result<i8> {
        (**self).read_byte()
    }

    fn read_char(&mut self) -> Result<char> {
        (**self).read_char()
    }

    fn read_short(&mut self) -> Result<i16> {
        (**self).read_short()
    }

    fn read_int(&mut self) -> Result<i32> {
        (**self).read_int()
    }

    fn read_long(&mut self) -> Result<i64> {
        (**self).read_long()
    }

    fn read_float(&mut self) -> Result<f32> {
        (**self).read_float()
    }

    fn read_double(&mut self) -> Result<f64> {
        (**self).read_double()
    }

    fn read_string(&mut self) -> Result<String> {
        (**self).read_string()
    }

    fn end_of_record(&mut self) -> Result<()> {
        (**self).end_of_record()
    }

    fn is_end_of_record_next(&mut self) -> Result<bool> {
        (**self).is_end_of_record_next()
    }

    fn can_read(&mut self) -> Result<bool> {
        (**self).can_read()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
