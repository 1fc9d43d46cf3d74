// Full record stack over a TSV file: enumerated ids, compact heads, delta counts.
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use tabstream::core::charset::Charset;
use tabstream::core::compact::{CompactSink, CompactSource};
use tabstream::core::data::{DataSink, DataSource};
use tabstream::core::deltas::{DeltasSink, DeltasSource};
use tabstream::core::enumerated::{
    EnumeratedSink, EnumeratedSource, Enumerator, MemoryEnumerator, Selection,
};
use tabstream::core::error::ErrorKind;
use tabstream::core::source::Seekable;
use tabstream::core::tsv::{TsvSink, TsvSource};

type Table = Rc<RefCell<MemoryEnumerator>>;

fn open_stack(
    path: &std::path::Path,
    table: &Table,
) -> EnumeratedSource<CompactSource<DeltasSource<TsvSource, fn(u32) -> bool>>, Table> {
    let tsv = TsvSource::open(path, Charset::Utf8).expect("open tsv");
    let compact = CompactSource::new(DeltasSource::all(tsv), 2).expect("compact");
    EnumeratedSource::new(compact, Selection::columns(Rc::clone(table), |column| column == 0))
}

fn read_pairs(source: &mut impl DataSource, table: &Table) -> Vec<(String, i32)> {
    let mut rows = Vec::new();
    while source.can_read().expect("can read") {
        let word = source.read_int().expect("word id");
        let count = source.read_int().expect("count");
        source.end_of_record().expect("eor");
        rows.push((table.value_of(word).expect("known id"), count));
    }
    rows
}

#[test]
fn records_survive_the_full_stack() {
    common::init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("counts.tsv");

    let mut table = MemoryEnumerator::shared();
    let cat = table.index_of("cat").expect("cat");
    let dog = table.index_of("dog").expect("dog");

    let tsv = TsvSink::create(&path, Charset::Utf8).expect("create");
    let compact = CompactSink::new(DeltasSink::all(tsv));
    let mut sink = EnumeratedSink::new(compact, Selection::columns(Rc::clone(&table), |c| c == 0));
    for (word, count) in [(cat, 5), (cat, 3), (dog, 1)] {
        sink.write_int(word).expect("word");
        sink.write_int(count).expect("count");
        sink.end_of_record().expect("eor");
    }
    sink.close().expect("close");

    let written = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(written, "cat\t5\t-2\ndog\t-2\n");

    let mut source = open_stack(&path, &table);
    assert_eq!(
        read_pairs(&mut source, &table),
        vec![
            ("cat".to_string(), 5),
            ("cat".to_string(), 3),
            ("dog".to_string(), 1)
        ]
    );
    source.close().expect("close source");
}

#[test]
fn seeking_restores_every_layer() {
    common::init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = common::write_file(temp.path(), "seek.tsv", b"ant\t1\t1\t1\nbee\t10\nfly\t-4\t2\n");
    let table = MemoryEnumerator::shared();
    let mut source = open_stack(&path, &table);

    let start = source.position().expect("start");
    let all = read_pairs(&mut source, &table);
    let counts: Vec<i32> = all.iter().map(|(_, count)| *count).collect();
    assert_eq!(counts, vec![1, 2, 3, 13, 9, 11]);

    // Rewind to the middle of the first compacted line.
    source.set_position(start).expect("rewind");
    source.read_int().expect("ant");
    source.read_int().expect("1");
    source.end_of_record().expect("eor");
    let middle = source.position().expect("middle");
    let rest = read_pairs(&mut source, &table);
    assert_eq!(rest.len(), 5);
    assert_eq!(rest[0], ("ant".to_string(), 2));

    source.set_position(middle).expect("seek middle");
    assert_eq!(read_pairs(&mut source, &table), rest);

    let end = source.position().expect("end");
    source.set_position(end).expect("seek end");
    assert!(!source.can_read().expect("can read"));
    assert_eq!(table.borrow().len(), 3);
}

#[test]
fn bad_values_report_where_they_are() {
    common::init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = common::write_file(temp.path(), "bad.tsv", b"cat\t5\nmouse\tmany\n");
    let table = MemoryEnumerator::shared();
    let mut source = open_stack(&path, &table);

    source.read_int().expect("cat");
    source.read_int().expect("5");
    source.end_of_record().expect("eor");
    source.read_int().expect("mouse");
    let err = source.read_int().expect_err("not a number");
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.is_data_error());
    assert_eq!(err.offset(), Some(12));
    assert_eq!(err.column(), Some(1));
    assert_eq!(err.path(), Some(path.as_path()));
    assert!(err.context().expect("context").contains("mouse\tmany"));
}

#[test]
fn missing_files_and_unknown_ids() {
    common::init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = TsvSource::open(temp.path().join("absent.tsv"), Charset::Utf8)
        .err()
        .map(|err| err.kind());
    assert_eq!(missing, Some(ErrorKind::NotFound));

    let table = MemoryEnumerator::shared();
    let tsv = TsvSink::create(temp.path().join("out.tsv"), Charset::Utf8).expect("create");
    let mut sink = EnumeratedSink::new(tsv, Selection::all(Rc::clone(&table)));
    let err = sink.write_int(42).expect_err("unassigned id");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
