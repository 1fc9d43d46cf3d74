//! Purpose: Streaming record I/O for corpus statistics tools.
//! Exports: `core` (char channels, lexing, TSV records, transforms, chunking, merging, errors).
//! Role: Library backing table readers, writers, and external sorts.
//! Invariants: Every read and write returns `core::error::Result`; nothing panics on bad input.
//! Invariants: Sources and sinks are single-owner; sharing is explicit (`Rc<RefCell<_>>`, `Arc`).
pub mod core;
