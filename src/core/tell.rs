//! Purpose: Composable position tokens for layered readers.
//! Exports: `Tell`, `TellValue`, `LexerMark`.
//! Role: Each seekable layer pushes its own state over the position of the layer beneath it.
//! Invariants: The innermost layer's value is at the bottom; the outermost is the head.
//! Invariants: Popping a value of the wrong variant is a `Usage` error, never a silent reset.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::data::Field;
use crate::core::error::{Error, Result};

/// Restart point of a lexer: the channel offset a decode started at, the
/// character distance from that point, and the logical character offset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LexerMark {
    pub channel_offset: u64,
    pub buffer_offset: usize,
    pub char_offset: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TellValue {
    Lexer(LexerMark),
    Offset(u64),
    Index(u64),
    Column(u32),
    Head(Option<Field>),
    Delta(i32),
}

impl TellValue {
    pub fn tag(&self) -> &'static str {
        match self {
            TellValue::Lexer(_) => "lexer",
            TellValue::Offset(_) => "offset",
            TellValue::Index(_) => "index",
            TellValue::Column(_) => "column",
            TellValue::Head(_) => "head",
            TellValue::Delta(_) => "delta",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tell {
    value: TellValue,
    next: Option<Box<Tell>>,
}

impl Tell {
    pub fn new(value: TellValue) -> Self {
        Self { value, next: None }
    }

    /// Stack `value` on top of this tell.
    pub fn push(self, value: TellValue) -> Self {
        Self {
            value,
            next: Some(Box::new(self)),
        }
    }

    pub fn value(&self) -> &TellValue {
        &self.value
    }

    pub fn next(&self) -> Option<&Tell> {
        self.next.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn depth(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |next| next.depth())
    }

    pub fn into_parts(self) -> (TellValue, Option<Tell>) {
        (self.value, self.next.map(|next| *next))
    }

    pub fn pop_column(self) -> Result<(u32, Tell)> {
        match self.pop("column")? {
            (TellValue::Column(column), rest) => Ok((column, rest)),
            (other, _) => Err(mismatch("column", &other)),
        }
    }

    pub fn pop_head(self) -> Result<(Option<Field>, Tell)> {
        match self.pop("head")? {
            (TellValue::Head(head), rest) => Ok((head, rest)),
            (other, _) => Err(mismatch("head", &other)),
        }
    }

    pub fn pop_delta(self) -> Result<(i32, Tell)> {
        match self.pop("delta")? {
            (TellValue::Delta(previous), rest) => Ok((previous, rest)),
            (other, _) => Err(mismatch("delta", &other)),
        }
    }

    /// Consume a tell that must hold exactly one lexer mark.
    pub fn into_lexer(self) -> Result<LexerMark> {
        match self.into_leaf("lexer")? {
            TellValue::Lexer(mark) => Ok(mark),
            other => Err(mismatch("lexer", &other)),
        }
    }

    pub fn into_index(self) -> Result<u64> {
        match self.into_leaf("index")? {
            TellValue::Index(index) => Ok(index),
            other => Err(mismatch("index", &other)),
        }
    }

    pub fn into_offset(self) -> Result<u64> {
        match self.into_leaf("offset")? {
            TellValue::Offset(offset) => Ok(offset),
            other => Err(mismatch("offset", &other)),
        }
    }

    fn pop(self, expected: &str) -> Result<(TellValue, Tell)> {
        match self.into_parts() {
            (value, Some(rest)) => Ok((value, rest)),
            (value, None) => Err(Error::usage(format!(
                "tell ends at {} but a {expected} layer expects an inner position",
                value.tag()
            ))),
        }
    }

    fn into_leaf(self, expected: &str) -> Result<TellValue> {
        match self.into_parts() {
            (value, None) => Ok(value),
            (value, Some(rest)) => Err(Error::usage(format!(
                "{expected} position expected at the bottom of the tell, found {} over {} more",
                value.tag(),
                rest.depth()
            ))),
        }
    }
}

impl fmt::Display for Tell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tell{{{:?}", self.value)?;
        if let Some(next) = &self.next {
            write!(f, ", inner={next}")?;
        }
        write!(f, "}}")
    }
}

fn mismatch(expected: &str, found: &TellValue) -> Error {
    Error::usage(format!(
        "tell mismatch: expected {expected}, found {}",
        found.tag()
    ))
}

#[cfg(test)]
mod tests {
    use super::{LexerMark, Tell, TellValue};
    use crate::core::data::Field;
    use crate::core::error::ErrorKind;

    fn stacked() -> Tell {
        Tell::new(TellValue::Lexer(LexerMark {
            channel_offset: 10,
            buffer_offset: 3,
            char_offset: 13,
        }))
        .push(TellValue::Column(1))
        .push(TellValue::Head(Some(Field::Str("cat".into()))))
        .push(TellValue::Column(2))
    }

    #[test]
    fn pops_in_reverse_push_order() {
        let tell = stacked();
        assert_eq!(tell.depth(), 4);

        let (column, tell) = tell.pop_column().expect("column");
        assert_eq!(column, 2);
        let (head, tell) = tell.pop_head().expect("head");
        assert_eq!(head, Some(Field::Str("cat".into())));
        let (column, tell) = tell.pop_column().expect("column");
        assert_eq!(column, 1);
        let mark = tell.into_lexer().expect("lexer");
        assert_eq!(mark.channel_offset, 10);
        assert_eq!(mark.buffer_offset, 3);
    }

    #[test]
    fn wrong_variant_is_a_usage_error() {
        let err = stacked().pop_delta().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.message().unwrap_or_default().contains("expected delta"));
    }

    #[test]
    fn popping_past_the_bottom_is_a_usage_error() {
        let err = Tell::new(TellValue::Column(0))
            .pop_column()
            .expect_err("no inner position");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = stacked().into_lexer().expect_err("not a leaf");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn push_leaves_the_original_usable() {
        let base = Tell::new(TellValue::Index(4));
        let pushed = base.clone().push(TellValue::Delta(-7));
        assert_eq!(base.depth(), 1);
        assert_eq!(pushed.next(), Some(&base));
    }

    #[test]
    fn serializes_for_checkpoints() {
        let tell = stacked();
        let json = serde_json::to_string(&tell).expect("serialize");
        let restored: Tell = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, tell);
    }
}
