//! Purpose: Single error type shared by every layer of the record-stream core.
//! Exports: `Error`, `ErrorKind`, `Result`.
//! Role: Separates caller bugs (`Usage`, `Exhausted`, `Closed`) from bad input data
//! (`Format`, `Corrupt`) and storage failures (`Io`).
//! Invariants: Context fields are optional and never required to render a message.
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Exhausted,
    Closed,
    NotFound,
    Format,
    Corrupt,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    offset: Option<u64>,
    column: Option<u64>,
    context: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            offset: None,
            column: None,
            context: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn column(&self) -> Option<u64> {
        self.column
    }

    /// Text recovered from the input around `offset`, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// True when the error signals a caller bug rather than bad data or I/O.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Usage | ErrorKind::Exhausted | ErrorKind::Closed
        )
    }

    pub fn is_data_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Format | ErrorKind::Corrupt)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_column(mut self, column: u64) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage).with_message(message)
    }

    pub(crate) fn exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exhausted).with_message(message)
    }

    pub(crate) fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Closed).with_message(message)
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format).with_message(message)
    }

    pub(crate) fn io(err: io::Error, path: &Path) -> Self {
        Self::new(ErrorKind::Io).with_path(path).with_source(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        if let Some(column) = self.column {
            write!(f, " (column: {column})")?;
        }
        if let Some(context) = &self.context {
            write!(f, " (context: {context:?})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Close every item, keeping the first failure.
pub(crate) fn close_all<I>(results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    let mut first = None;
    for result in results {
        if let Err(err) = result
            && first.is_none()
        {
            first = Some(err);
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{close_all, Error, ErrorKind};
    use std::error::Error as StdError;

    #[test]
    fn kinds_split_caller_bugs_from_bad_data() {
        let cases = [
            (ErrorKind::Usage, true, false),
            (ErrorKind::Exhausted, true, false),
            (ErrorKind::Closed, true, false),
            (ErrorKind::Format, false, true),
            (ErrorKind::Corrupt, false, true),
            (ErrorKind::Io, false, false),
            (ErrorKind::NotFound, false, false),
            (ErrorKind::Internal, false, false),
        ];

        for (kind, contract, data) in cases {
            let err = Error::new(kind);
            assert_eq!(err.is_contract_violation(), contract, "{kind:?}");
            assert_eq!(err.is_data_error(), data, "{kind:?}");
        }
    }

    #[test]
    fn display_includes_location_and_context() {
        let err = Error::new(ErrorKind::Format)
            .with_message("expecting delimiter '\\t'")
            .with_path("/tmp/events.tsv")
            .with_offset(128)
            .with_column(2)
            .with_context("cat\t5\n");
        let text = err.to_string();
        assert!(text.starts_with("Format: expecting delimiter"));
        assert!(text.contains("(path: /tmp/events.tsv)"));
        assert!(text.contains("(offset: 128)"));
        assert!(text.contains("(column: 2)"));
        assert!(text.contains("(context: \"cat\\t5\\n\")"));
    }

    #[test]
    fn io_source_is_exposed() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::io(io, std::path::Path::new("x"));
        assert_eq!(err.kind(), ErrorKind::Io);
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn close_all_keeps_first_error() {
        let results = vec![
            Ok(()),
            Err(Error::usage("first")),
            Err(Error::closed("second")),
        ];
        let err = close_all(results).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.message(), Some("first"));
        close_all(vec![Ok(()), Ok(())]).expect("all ok");
    }
}
