// Core modules implementing channels, lexing, record transforms, and merging.
pub mod channel;
pub mod charset;
pub mod chunker;
pub mod compact;
pub mod data;
pub mod deltas;
pub mod enumerated;
pub mod error;
pub mod lexer;
pub mod memory;
pub mod merge;
pub mod sort;
pub mod source;
pub mod tell;
pub mod tsv;
