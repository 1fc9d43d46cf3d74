//! Purpose: Sort a stream larger than memory: chunk it, sort chunks in parallel, spill, merge.
//! Exports: `external_sort`, `sort_in_memory`, `SortOptions`, `RecordCodec`, `RunStore`,
//! `TsvRunStore`, `RunSource`, `SortedRun`.
//! Role: Drives `Chunker` and the merge tree end to end.
//! Invariants: `external_sort` holds at most one batch of chunks; every sorted run goes to the store.
//! Invariants: Each run is sorted stably; the merge reads runs back one record at a time.
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::core::charset::Charset;
use crate::core::chunker::{Chunker, DEFAULT_MAX_CHUNK_SIZE};
use crate::core::data::{DataSink, DataSource};
use crate::core::error::{close_all, Error, Result};
use crate::core::merge::{merge, Comparator, MergeNode};
use crate::core::source::{IterSource, ObjectSource};
use crate::core::tsv::{TsvSink, TsvSource};

/// One sorted partition kept in memory.
pub type SortedRun<T> = IterSource<std::vec::IntoIter<T>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SortOptions {
    pub max_chunk_size: usize,
    /// Sort one chunk per rayon worker at a time; otherwise one chunk at a time.
    pub parallel: bool,
}

impl SortOptions {
    pub fn new() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            parallel: true,
        }
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn chunks_per_batch(&self) -> usize {
        if self.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        }
    }
}

impl Default for SortOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an item to the fields of one record and back. The sort ends records itself.
pub trait RecordCodec<T> {
    fn write(&self, sink: &mut dyn DataSink, item: &T) -> Result<()>;

    fn read(&self, source: &mut dyn DataSource) -> Result<T>;
}

/// Storage for spilled runs, addressed by run number from 0.
///
/// Implementations choose the file format and any transform stack; a run is
/// opened only after its sink was closed.
pub trait RunStore {
    type Sink: DataSink;
    type Source: DataSource;

    fn create(&mut self, run: usize) -> Result<Self::Sink>;

    fn open(&mut self, run: usize) -> Result<Self::Source>;
}

/// Runs as `run-<n>.tsv` files in a caller-owned directory.
#[derive(Clone, Debug)]
pub struct TsvRunStore {
    dir: PathBuf,
    charset: Charset,
    runs: Vec<PathBuf>,
}

impl TsvRunStore {
    pub fn new(dir: impl Into<PathBuf>, charset: Charset) -> Self {
        Self {
            dir: dir.into(),
            charset,
            runs: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_path(&self, run: usize) -> PathBuf {
        self.dir.join(format!("run-{run}.tsv"))
    }

    /// Files created so far, in run order.
    pub fn runs(&self) -> &[PathBuf] {
        &self.runs
    }
}

impl RunStore for TsvRunStore {
    type Sink = TsvSink;
    type Source = TsvSource;

    fn create(&mut self, run: usize) -> Result<TsvSink> {
        let path = self.run_path(run);
        let sink = TsvSink::create(&path, self.charset)?;
        self.runs.push(path);
        Ok(sink)
    }

    fn open(&mut self, run: usize) -> Result<TsvSource> {
        TsvSource::open(self.run_path(run), self.charset)
    }
}

/// A spilled run read back as objects.
pub struct RunSource<T, D, C> {
    source: D,
    codec: Rc<C>,
    _items: PhantomData<fn() -> T>,
}

impl<T, D: DataSource, C: RecordCodec<T>> RunSource<T, D, C> {
    pub fn new(source: D, codec: Rc<C>) -> Self {
        Self {
            source,
            codec,
            _items: PhantomData,
        }
    }

    pub fn into_inner(self) -> D {
        self.source
    }
}

impl<T, D: DataSource, C: RecordCodec<T>> ObjectSource<T> for RunSource<T, D, C> {
    fn has_next(&mut self) -> Result<bool> {
        self.source.can_read()
    }

    fn read(&mut self) -> Result<T> {
        if !self.source.can_read()? {
            return Err(Error::exhausted("sorted run is exhausted"));
        }
        let item = self.codec.read(&mut self.source)?;
        self.source.end_of_record()?;
        Ok(item)
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

/// Consume `source`, spilling sorted runs into `store`, and return a merge
/// tree over the stored runs. The source is closed once it has been read.
pub fn external_sort<T, S, R, C>(
    source: S,
    options: SortOptions,
    comparator: Comparator<T>,
    store: &mut R,
    codec: C,
) -> Result<MergeNode<T, RunSource<T, R::Source, C>>>
where
    T: Send,
    S: ObjectSource<T>,
    R: RunStore,
    C: RecordCodec<T>,
{
    let mut chunker = Chunker::new(source, options.max_chunk_size)?;
    let per_batch = options.chunks_per_batch();
    let mut batch: Vec<Vec<T>> = Vec::with_capacity(per_batch);
    let mut runs = 0;
    let mut items = 0;
    loop {
        let more = chunker.has_next()?;
        if more {
            batch.push(chunker.read()?.into_items());
        }
        if batch.len() == per_batch || (!more && !batch.is_empty()) {
            sort_runs(&mut batch, options.parallel, &comparator);
            for run in batch.drain(..) {
                items += run.len();
                spill(store, runs, &run, &codec)?;
                runs += 1;
            }
        }
        if !more {
            break;
        }
    }
    chunker.close()?;
    debug!(items, runs, parallel = options.parallel, "spilled sorted runs");

    let codec = Rc::new(codec);
    let sources = (0..runs)
        .map(|run| -> Result<_> { Ok(RunSource::new(store.open(run)?, Rc::clone(&codec))) })
        .collect::<Result<Vec<_>>>()?;
    Ok(merge(comparator, sources))
}

/// Like `external_sort`, but every sorted chunk stays in memory.
pub fn sort_in_memory<T, S>(
    source: S,
    options: SortOptions,
    comparator: Comparator<T>,
) -> Result<MergeNode<T, SortedRun<T>>>
where
    T: Send,
    S: ObjectSource<T>,
{
    let mut chunker = Chunker::new(source, options.max_chunk_size)?;
    let mut runs: Vec<Vec<T>> = Vec::new();
    while chunker.has_next()? {
        runs.push(chunker.read()?.into_items());
    }
    chunker.close()?;

    let items: usize = runs.iter().map(Vec::len).sum();
    sort_runs(&mut runs, options.parallel, &comparator);
    debug!(
        items,
        runs = runs.len(),
        parallel = options.parallel,
        "sorted chunks in memory"
    );

    Ok(merge(comparator, runs.into_iter().map(IterSource::new).collect()))
}

fn sort_runs<T: Send>(runs: &mut [Vec<T>], parallel: bool, comparator: &Comparator<T>) {
    if parallel {
        runs.par_iter_mut()
            .for_each(|run| run.sort_by(|a, b| comparator(a, b)));
    } else {
        for run in runs.iter_mut() {
            run.sort_by(|a, b| comparator(a, b));
        }
    }
}

fn spill<T, R, C>(store: &mut R, run: usize, items: &[T], codec: &C) -> Result<()>
where
    R: RunStore,
    C: RecordCodec<T>,
{
    let mut sink = store.create(run)?;
    let written = items.iter().try_for_each(|item| {
        codec.write(&mut sink, item)?;
        sink.end_of_record()
    });
    let closed = sink.close();
    close_all([written, closed])?;
    trace!(run, items = items.len(), "spilled run");
    Ok(())
}
